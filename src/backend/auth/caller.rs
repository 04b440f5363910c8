/**
 * Caller Identification
 *
 * `CallerId` is an axum extractor that resolves the requesting user:
 *
 * 1. `Authorization: Bearer <jwt>` verified against `auth.jwt_secret`
 * 2. With `auth.dev_bypass` enabled, `X-Dev-User-Id: <uuid>` is accepted
 *    when no bearer token is present
 *
 * Anything else is rejected with 401 before the handler runs.
 */
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use uuid::Uuid;

use super::sessions::get_user_id_from_token;
use crate::backend::error::BackendError;
use crate::backend::server::config::AuthConfig;

pub const DEV_USER_HEADER: &str = "x-dev-user-id";

/// Authenticated caller of the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub Uuid);

impl CallerId {
    /// Resolve the caller from request headers
    pub fn from_headers(
        headers: &axum::http::HeaderMap,
        auth: &AuthConfig,
    ) -> Result<Self, BackendError> {
        if let Some(value) = headers.get(AUTHORIZATION) {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .ok_or_else(|| {
                    tracing::warn!("[Auth] Invalid Authorization header format");
                    BackendError::unauthorized("Invalid Authorization header")
                })?;

            let user_id = get_user_id_from_token(token, &auth.jwt_secret).map_err(|e| {
                tracing::warn!("[Auth] {}", e);
                BackendError::unauthorized("Invalid or expired token")
            })?;
            return Ok(Self(user_id));
        }

        if auth.dev_bypass {
            if let Some(value) = headers.get(DEV_USER_HEADER) {
                let user_id = value
                    .to_str()
                    .ok()
                    .and_then(|v| Uuid::parse_str(v.trim()).ok())
                    .ok_or_else(|| BackendError::unauthorized("Invalid X-Dev-User-Id header"))?;
                tracing::debug!("[Auth] Dev bypass for {}", user_id);
                return Ok(Self(user_id));
            }
        }

        tracing::warn!("[Auth] Missing Authorization header");
        Err(BackendError::unauthorized("Missing Authorization header"))
    }
}

impl<S> FromRequestParts<S> for CallerId
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = BackendError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<CallerId>() {
            return Ok(*caller);
        }
        let auth = AuthConfig::from_ref(state);
        let caller = Self::from_headers(&parts.headers, &auth)?;
        parts.extensions.insert(caller);
        Ok(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::auth::sessions::{create_token, TOKEN_TTL_SECS};
    use axum::http::{HeaderMap, HeaderValue, StatusCode};

    fn auth(dev_bypass: bool) -> AuthConfig {
        AuthConfig {
            jwt_secret: "secret".to_string(),
            dev_bypass,
        }
    }

    #[test]
    fn test_bearer_token() {
        let user_id = Uuid::new_v4();
        let token = create_token(user_id, "secret", TOKEN_TTL_SECS).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let caller = CallerId::from_headers(&headers, &auth(false)).unwrap();
        assert_eq!(caller, CallerId(user_id));
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        let err = CallerId::from_headers(&HeaderMap::new(), &auth(false)).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_malformed_header_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(CallerId::from_headers(&headers, &auth(false)).is_err());
    }

    #[test]
    fn test_dev_header_needs_bypass() {
        let user_id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            DEV_USER_HEADER,
            HeaderValue::from_str(&user_id.to_string()).unwrap(),
        );

        assert!(CallerId::from_headers(&headers, &auth(false)).is_err());
        assert_eq!(
            CallerId::from_headers(&headers, &auth(true)).unwrap(),
            CallerId(user_id)
        );
    }
}
