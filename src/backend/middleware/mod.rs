//! Middleware Module
//!
//! HTTP middleware applied to route groups.
//!
//! - **`auth`** - community membership guard (`require_membership`)
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::middleware::from_fn_with_state;
//! use community_relay::backend::middleware::require_membership;
//!
//! let guarded = Router::new()
//!     .route("/api/communities/{community_id}/chat/stream", get(community_stream))
//!     .route_layer(from_fn_with_state(state.clone(), require_membership));
//! ```

pub mod auth;

pub use auth::{require_membership, AuthorizedCommunity};
