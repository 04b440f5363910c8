//! Shared Module
//!
//! Wire types shared by the relay server and its clients: conversation
//! messages, presence projections, parent keys and the named relay events.
//! Everything here is plain serde data with no server dependencies.

/// Message and presence data structures
pub mod message;

/// Relay event wire format
pub mod event;

/// Conversation parent keys
pub mod key;

/// Shared error types
pub mod error;

pub use error::SharedError;
pub use event::{RelayEvent, RelayFrame};
pub use key::ParentKey;
pub use message::{Message, PresenceUser, SenderProfile};
