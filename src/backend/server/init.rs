/**
 * Server Initialization
 *
 * Builds the store, the relay and the router.
 *
 * # Initialization Process
 *
 * 1. Connect to PostgreSQL if `database_url` is configured
 * 2. Run migrations (failures are logged, startup continues)
 * 3. Fall back to the in-memory store when no database is available
 * 4. Create `AppState` and the router
 */
use std::sync::Arc;

use axum::Router;

use crate::backend::routes::router::create_router;
use crate::backend::server::config::{load_database, ServerConfig};
use crate::backend::server::state::AppState;
use crate::backend::store::{MemoryStore, PgStore, RelayStore};

/// Create and configure the Axum application
pub async fn create_app(config: ServerConfig) -> Router<()> {
    tracing::info!("[Server] Initializing community relay");

    match load_database(config.database_url.as_deref()).await {
        Some(pool) => {
            let store = PgStore::new(pool);

            tracing::info!("[Server] Running database migrations...");
            match store.migrate().await {
                Ok(()) => tracing::info!("[Server] Database migrations completed successfully"),
                Err(e) => {
                    tracing::error!("[Server] Failed to run database migrations: {}", e);
                    tracing::warn!("[Server] Continuing, the schema may be out of date");
                }
            }

            create_app_with_store(Arc::new(store), config)
        }
        None => create_app_with_store(Arc::new(MemoryStore::new()), config),
    }
}

/// Build the router over an already constructed store
pub fn create_app_with_store<S>(store: Arc<S>, config: ServerConfig) -> Router<()>
where
    S: RelayStore + 'static,
{
    tracing::info!(
        "[Server] Relay configured: presence every {}s, {:?} diffing, keep-alive {}s",
        config.relay.presence_interval_secs,
        config.relay.diff_strategy,
        config.relay.keep_alive_secs
    );

    let app_state = AppState::new(store, config);
    create_router(app_state)
}
