/**
 * Router Configuration
 *
 * Combines the health check, the relay stream routes and the write routes
 * into one router, wrapped in a `tower-http` trace layer.
 *
 * # Route Details
 *
 * - `GET /health` - liveness plus the number of open relay sessions
 * - stream routes - see `stream_routes`
 * - write routes - see `api_routes`
 *
 * Unknown paths answer 404 with the usual JSON error body.
 */
use axum::{extract::State, routing::get, Json, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::backend::error::BackendError;
use crate::backend::relay::EventRelay;
use crate::backend::routes::api_routes::configure_api_routes;
use crate::backend::routes::stream_routes::configure_stream_routes;
use crate::backend::server::state::AppState;

/// `GET /health`
pub async fn health(State(relay): State<EventRelay>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "activeSessions": relay.active_sessions(),
    }))
}

async fn not_found() -> BackendError {
    BackendError::not_found("Route")
}

/// Create the Axum router with all routes configured
pub fn create_router(app_state: AppState) -> Router<()> {
    let router = Router::new().route("/health", get(health));

    let router = configure_stream_routes(router, &app_state);
    let router = configure_api_routes(router, &app_state);

    router
        .fallback(not_found)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state)
}
