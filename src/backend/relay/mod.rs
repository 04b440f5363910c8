//! Event Relay Module
//!
//! Streams one conversation to one client: an `initial` snapshot, then
//! message inserts and deletions, calendar-event status changes and presence
//! updates, until the client disconnects.
//!
//! # Architecture
//!
//! - **`service`** - `EventRelay::subscribe`: existence and access checks,
//!   listener registration, lazy conversation create, session spawn
//! - **`session`** - one task per subscription, `select!`ing over disconnect,
//!   deadline, change notifications and the presence poll
//! - **`diff`** - turns two conversation reads into relay events
//! - **`presence`** - online-member projection and change detection
//! - **`sse`** - axum `Sse` adapter
//!
//! # Module Structure
//!
//! ```text
//! relay/
//! ├── mod.rs      - Module exports and documentation
//! ├── service.rs  - EventRelay and RelaySubscription
//! ├── session.rs  - RelaySession state machine
//! ├── diff.rs     - DiffStrategy and snapshot diffing
//! ├── presence.rs - PresenceTracker
//! └── sse.rs      - SSE response construction
//! ```
//!
//! # Data Flow
//!
//! ```text
//! store write ──▶ ChangeListener ──▶ RelaySession ──re-read + diff──▶ mpsc ──▶ Sse
//!                                        ▲
//!                     presence poll ─────┘
//! ```

pub mod diff;
pub mod presence;
pub mod service;
pub mod session;
pub mod sse;

pub use diff::{diff_snapshots, ConversationSnapshot, DiffStrategy};
pub use presence::{presence_snapshot, PresenceTracker};
pub use service::{EventRelay, RelaySubscription};
pub use session::{SessionState, CHANGE_STREAM_ERROR};
pub use sse::into_sse_response;
