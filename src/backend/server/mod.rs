//! Server Module
//!
//! Configuration, shared state and application assembly.
//!
//! # Module Structure
//!
//! ```text
//! server/
//! ├── mod.rs    - Module exports and documentation
//! ├── state.rs  - AppState and FromRef implementations
//! ├── config.rs - ServerConfig loading (TOML file + environment)
//! └── init.rs   - Store selection and app creation
//! ```
//!
//! # Initialization Flow
//!
//! 1. **Configuration Loading**: `ServerConfig::load()`
//! 2. **Store Selection**: PostgreSQL when reachable, in-memory otherwise
//! 3. **State Creation**: `AppState` wraps the store and one `EventRelay`
//! 4. **Router Creation**: stream and write routes, tracing layer
//!
//! # Example
//!
//! ```rust,no_run
//! use community_relay::backend::server::{create_app, ServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::load()?;
//! let app = create_app(config).await;
//! # Ok(())
//! # }
//! ```

/// Application state management
pub mod state;

/// Server configuration loading
pub mod config;

/// Server initialization
pub mod init;

pub use config::{AuthConfig, ConfigError, RelayConfig, ServerConfig};
pub use init::{create_app, create_app_with_store};
pub use state::{AppState, SharedStore};
