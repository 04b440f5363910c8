//! Community Relay - Main Library
//!
//! Real-time event relay for a community platform. A client subscribes to
//! one conversation (a community's chat, or the discussion thread of one
//! calendar event) and receives, over Server-Sent Events:
//!
//! - an `initial` snapshot of messages and online members
//! - `newMessage` / `deleteMessage` as the conversation changes
//! - `statusChange` when a calendar event's status changes
//! - `onlineUsers` when the set of online members changes
//! - `error` if the store's change feed fails
//!
//! # Module Structure
//!
//! - **`shared`** - Wire types shared with clients (messages, events, keys)
//! - **`backend`** - Server-side code (only compiled with the `ssr` feature)
//!   - Store contracts with in-memory and PostgreSQL implementations
//!   - The event relay and its SSE transport
//!   - Axum routes, caller authentication, configuration
//!
//! # Feature Flags
//!
//! - **`ssr`** (default) - enables the backend, Axum and sqlx
//!
//! # Usage
//!
//! ```rust,no_run
//! use community_relay::backend::server::{create_app, ServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = create_app(ServerConfig::load()?).await;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
#[cfg(feature = "ssr")]
pub mod backend;
