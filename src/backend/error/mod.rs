//! Backend Error Module
//!
//! Error types returned by the HTTP layer and the relay's pre-stream checks.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - Error type definitions
//! └── conversion.rs - IntoResponse implementation
//! ```
//!
//! # Error Types
//!
//! - `NotFound` / `Forbidden` / `Unauthorized` - request rejected before streaming
//! - `TransientWriteFailure` - lazy conversation create failed
//! - `HandlerError` - any other handler failure with an explicit status
//! - `Store` - wrapped `StoreError`
//! - `SharedError` - rejected write fields and relay payload encoding
//! - `SerializationError` - JSON failures outside the relay events

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

pub use types::BackendError;
