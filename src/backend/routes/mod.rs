//! Route Configuration Module
//!
//! # Module Structure
//!
//! ```text
//! routes/
//! ├── mod.rs           - Module exports and documentation
//! ├── router.rs        - Router assembly, health check, trace layer
//! ├── stream_routes.rs - SSE relay endpoints
//! └── api_routes.rs    - Write endpoints (messages, status, presence)
//! ```
//!
//! # Authorization
//!
//! Community-scoped routes run `middleware::require_membership` as a route
//! layer. The calendar-event stream is the exception: the relay performs
//! its own member-or-creator check.

pub mod api_routes;
pub mod router;
pub mod stream_routes;

pub use router::create_router;
