/**
 * Relay Stream Routes
 *
 * # Routes
 *
 * - `GET /api/communities/{community_id}/chat/stream` - community chat stream,
 *   guarded by `require_membership`
 * - `GET /api/communities/{community_id}/calendar/{event_id}/stream` -
 *   calendar-event stream; the relay checks membership itself
 *
 * Both answer `text/event-stream` on success and a JSON error body otherwise.
 */
use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    response::Response,
    routing::get,
    Router,
};
use uuid::Uuid;

use crate::backend::auth::CallerId;
use crate::backend::error::BackendError;
use crate::backend::middleware::require_membership;
use crate::backend::relay::{into_sse_response, EventRelay};
use crate::backend::server::state::AppState;
use crate::shared::ParentKey;

/// `GET /api/communities/{community_id}/chat/stream`
pub async fn community_stream(
    State(relay): State<EventRelay>,
    caller: CallerId,
    Path(community_id): Path<Uuid>,
) -> Result<Response, BackendError> {
    tracing::info!("[Relay] Chat stream requested for community {}", community_id);
    let subscription = relay
        .subscribe(ParentKey::community(community_id), caller.0)
        .await?;
    Ok(into_sse_response(subscription, relay.config().keep_alive_interval()))
}

/// `GET /api/communities/{community_id}/calendar/{event_id}/stream`
pub async fn calendar_stream(
    State(relay): State<EventRelay>,
    caller: CallerId,
    Path((community_id, event_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, BackendError> {
    tracing::info!(
        "[Relay] Event stream requested for event {} in community {}",
        event_id,
        community_id
    );
    let subscription = relay
        .subscribe(ParentKey::calendar_event(community_id, event_id), caller.0)
        .await?;
    Ok(into_sse_response(subscription, relay.config().keep_alive_interval()))
}

/// Add the relay stream routes
pub fn configure_stream_routes(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    let guarded = Router::new()
        .route(
            "/api/communities/{community_id}/chat/stream",
            get(community_stream),
        )
        .route_layer(from_fn_with_state(state.clone(), require_membership));

    router.merge(guarded).route(
        "/api/communities/{community_id}/calendar/{event_id}/stream",
        get(calendar_stream),
    )
}
