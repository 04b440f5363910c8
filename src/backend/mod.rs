//! Backend Module
//!
//! All server-side code. Only compiled when the `ssr` feature is enabled.
//!
//! # Architecture
//!
//! - **`store`** - store contracts (`ConversationStore`, `MembershipSource`,
//!   `ConversationWriter`, `ChangeListener`) and their implementations
//! - **`relay`** - the event relay: subscribe, per-subscription session task,
//!   change diffing, presence reconciliation, SSE adapter
//! - **`auth`** - JWT verification and the `CallerId` extractor
//! - **`middleware`** - community membership guard
//! - **`routes`** - HTTP route configuration and router assembly
//! - **`server`** - configuration, `AppState`, app initialization
//! - **`error`** - `BackendError` and its HTTP conversion
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs       - Module exports and documentation
//! ├── main.rs      - Server binary
//! ├── store/       - Persistence and change notifications
//! ├── relay/       - Event relay
//! ├── auth/        - Caller identification
//! ├── middleware/  - Route guards
//! ├── routes/      - Route configuration
//! ├── server/      - Config, state, initialization
//! └── error/       - Error types
//! ```
//!
//! # Dependency Order
//!
//! ```text
//! store ──▶ relay ──▶ routes ──▶ server
//! ```

/// Persistent store contracts and implementations
pub mod store;

/// Event relay
pub mod relay;

/// Caller identification
pub mod auth;

/// HTTP middleware
pub mod middleware;

/// HTTP route configuration
pub mod routes;

/// Server initialization, state and configuration
pub mod server;

/// Backend-specific error types
pub mod error;

pub use error::BackendError;
pub use relay::{EventRelay, RelaySubscription, SessionState};
pub use server::{create_app, AppState, ServerConfig};
