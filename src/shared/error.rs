//! Wire-Level Errors
//!
//! Failures that belong to the shared wire types rather than to the server:
//! a relay event whose payload could not be encoded, or client input for a
//! conversation write that is rejected before it reaches the store.
//!
//! ```rust
//! use community_relay::shared::error::SharedError;
//!
//! let error = SharedError::invalid_field("content", "Message must not be empty");
//! assert!(error.is_client_error());
//! ```
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// The `data:` payload of a named relay event failed to serialize
    #[error("Failed to encode {event} payload: {message}")]
    PayloadEncoding { event: &'static str, message: String },

    /// A field of a write request was rejected
    #[error("Invalid {field}: {message}")]
    InvalidField { field: &'static str, message: String },
}

impl SharedError {
    pub fn payload_encoding(event: &'static str, err: serde_json::Error) -> Self {
        Self::PayloadEncoding {
            event,
            message: err.to_string(),
        }
    }

    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }

    /// `true` when the caller sent something it can correct
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidField { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_field_names_the_field() {
        let error = SharedError::invalid_field("status", "Status must not be empty");

        assert!(error.is_client_error());
        assert_eq!(error.to_string(), "Invalid status: Status must not be empty");
    }

    #[test]
    fn test_payload_encoding_names_the_event() {
        let cause = serde_json::from_str::<serde_json::Value>("{ not json").unwrap_err();
        let error = SharedError::payload_encoding("newMessage", cause);

        assert!(!error.is_client_error());
        assert!(error.to_string().starts_with("Failed to encode newMessage payload"));
    }
}
