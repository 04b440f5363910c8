/**
 * Error Conversion
 *
 * `BackendError` implements `IntoResponse`, so handlers return it directly.
 *
 * # Response Format
 *
 * ```json
 * {
 *   "error": "Community not found",
 *   "status": 404
 * }
 * ```
 */

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::backend::error::types::BackendError;

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("[Server] Request failed: {}", self);
        } else {
            tracing::debug!("[Server] Request rejected ({}): {}", status.as_u16(), message);
        }

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
