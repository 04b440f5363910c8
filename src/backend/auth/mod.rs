//! Authentication Module
//!
//! Identifies the caller of a request. Accounts, signup and login belong to
//! an external service; this module only verifies the tokens it issues.
//!
//! # Module Structure
//!
//! ```text
//! auth/
//! ├── mod.rs      - Module exports and documentation
//! ├── sessions.rs - JWT creation and verification
//! └── caller.rs   - CallerId extractor (bearer token, dev bypass)
//! ```

/// JWT token generation and validation
pub mod sessions;

/// Request extractor for the authenticated caller
pub mod caller;

pub use caller::{CallerId, DEV_USER_HEADER};
pub use sessions::{create_token, verify_token, Claims};
