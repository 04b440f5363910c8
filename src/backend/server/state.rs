/**
 * Application State Management
 *
 * `AppState` is cloned into every handler. It holds the process-scoped
 * clients, built once in `create_app`:
 *
 * - `relay` - the `EventRelay` serving stream subscriptions
 * - `store` - the backing store, for the write routes
 * - `config` - the loaded `ServerConfig`
 *
 * # State Extraction
 *
 * The `FromRef` implementations let handlers and extractors take only the
 * part they need, e.g. `State(relay): State<EventRelay>` or the
 * `AuthConfig` read by `CallerId`.
 *
 * ```rust,ignore
 * use axum::extract::State;
 * use community_relay::backend::relay::EventRelay;
 *
 * async fn handler(State(relay): State<EventRelay>) {
 *     let open = relay.active_sessions();
 * }
 * ```
 */
use std::sync::Arc;

use axum::extract::FromRef;

use crate::backend::relay::EventRelay;
use crate::backend::server::config::{AuthConfig, ServerConfig};
use crate::backend::store::RelayStore;

/// Shared backing store handle
pub type SharedStore = Arc<dyn RelayStore>;

#[derive(Clone)]
pub struct AppState {
    pub relay: EventRelay,
    pub store: SharedStore,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wire a relay and the write side to the same store
    pub fn new<S>(store: Arc<S>, config: ServerConfig) -> Self
    where
        S: RelayStore + 'static,
    {
        Self {
            relay: EventRelay::new(store.clone(), config.relay.clone()),
            store,
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for EventRelay {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.relay.clone()
    }
}

impl FromRef<AppState> for SharedStore {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for AuthConfig {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.config.auth.clone()
    }
}

impl FromRef<AppState> for Arc<ServerConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.config.clone()
    }
}
