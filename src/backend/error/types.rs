/**
 * Backend Error Types
 *
 * Errors raised before a relay stream opens, and by the write routes. Each
 * variant maps to one HTTP status and is rendered as a JSON body by the
 * `IntoResponse` impl in `conversion.rs`.
 *
 * # Error Categories
 *
 * ## Lookup and Access
 *
 * - `NotFound` - the community or calendar event does not exist
 * - `Forbidden` - the caller is neither a member nor the creator
 * - `Unauthorized` - no caller could be identified
 *
 * ## Store
 *
 * - `TransientWriteFailure` - the lazy conversation create failed
 * - `Store` - any other store failure
 *
 * Failures after the stream is open never surface here: they become an
 * in-band `error` event instead.
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::store::StoreError;
use crate::shared::SharedError;

/// Backend-specific error types
///
/// # Usage
///
/// ```rust
/// use community_relay::backend::error::BackendError;
///
/// let err = BackendError::not_found("Community");
/// assert_eq!(err.status_code().as_u16(), 404);
/// ```
#[derive(Debug, Error)]
pub enum BackendError {
    /// A referenced entity does not exist
    #[error("{resource} not found")]
    NotFound {
        /// What was looked up, e.g. "Community"
        resource: String,
    },

    /// The caller may not access this conversation
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// No valid caller identity on the request
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// A write needed to open the stream failed; the client may retry
    #[error("Transient write failure: {message}")]
    TransientWriteFailure { message: String },

    /// Handler error (e.g. malformed body)
    #[error("Handler error: {message}")]
    HandlerError {
        /// HTTP status code for this error
        status: StatusCode,
        /// Human-readable error message
        message: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Shared error (from shared module)
    #[error(transparent)]
    SharedError(#[from] SharedError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BackendError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn transient_write(message: impl Into<String>) -> Self {
        Self::TransientWriteFailure {
            message: message.into(),
        }
    }

    /// Create a new handler error with a status code
    ///
    /// ```rust
    /// use community_relay::backend::error::BackendError;
    /// use axum::http::StatusCode;
    ///
    /// let err = BackendError::handler(StatusCode::BAD_REQUEST, "Invalid request");
    /// ```
    pub fn handler(status: StatusCode, message: impl Into<String>) -> Self {
        Self::HandlerError {
            status,
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    ///
    /// # Status Code Mapping
    ///
    /// - `NotFound` - 404
    /// - `Forbidden` - 403
    /// - `Unauthorized` - 401
    /// - `TransientWriteFailure` - 500
    /// - `HandlerError` - Uses the status code from the error
    /// - `Store` - 404 for a missing record, 500 otherwise
    /// - `SharedError` - 400 for a rejected field, 500 for payload encoding
    /// - `SerializationError` - 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::TransientWriteFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::HandlerError { status, .. } => *status,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SharedError(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            Self::SharedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable error message
    pub fn message(&self) -> String {
        match self {
            Self::NotFound { .. } => self.to_string(),
            Self::Forbidden { message }
            | Self::Unauthorized { message }
            | Self::TransientWriteFailure { message }
            | Self::HandlerError { message, .. } => message.clone(),
            Self::Store(err) => err.to_string(),
            Self::SharedError(err) => err.to_string(),
            Self::SerializationError(err) => err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found() {
        let error = BackendError::not_found("Community");
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(error.message(), "Community not found");
    }

    #[test]
    fn test_handler_error() {
        let error = BackendError::handler(StatusCode::BAD_REQUEST, "Invalid request");
        match error {
            BackendError::HandlerError { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "Invalid request");
            }
            _ => panic!("Expected HandlerError"),
        }
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(BackendError::forbidden("no").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(BackendError::unauthorized("no").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            BackendError::transient_write("insert failed").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            BackendError::from(StoreError::NotFound("Message".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BackendError::from(StoreError::ListenerClosed).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_shared_error() {
        let backend_error: BackendError = SharedError::invalid_field("content", "empty").into();

        match backend_error {
            BackendError::SharedError(_) => {}
            _ => panic!("Expected SharedError variant"),
        }
        assert_eq!(backend_error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_message() {
        let error = BackendError::forbidden("Not a member of this community");
        assert_eq!(error.message(), "Not a member of this community");
    }
}
