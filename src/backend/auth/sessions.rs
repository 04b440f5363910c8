/**
 * Session Tokens
 *
 * HS256 JWTs whose `sub` claim is the caller's user id. Token issuance lives
 * with the external auth service; `create_token` exists for tooling and
 * tests.
 */
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default token lifetime: 30 days
pub const TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Create a JWT token for a user
pub fn create_token(
    user_id: Uuid,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = now_secs();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + ttl_secs,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify signature and expiry, returning the claims
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let token_data = decode::<Claims>(token, &key, &Validation::default())?;
    Ok(token_data.claims)
}

/// Extract user ID from token
pub fn get_user_id_from_token(token: &str, secret: &str) -> Result<Uuid, String> {
    let claims =
        verify_token(token, secret).map_err(|e| format!("Token verification failed: {}", e))?;
    Uuid::parse_str(&claims.sub).map_err(|e| format!("Invalid user ID in token: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_verify_token() {
        let user_id = Uuid::new_v4();
        let token = create_token(user_id, SECRET, TOKEN_TTL_SECS).unwrap();

        let claims = verify_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_get_user_id_from_token() {
        let user_id = Uuid::new_v4();
        let token = create_token(user_id, SECRET, TOKEN_TTL_SECS).unwrap();

        assert_eq!(get_user_id_from_token(&token, SECRET).unwrap(), user_id);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = create_token(Uuid::new_v4(), SECRET, TOKEN_TTL_SECS).unwrap();
        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_verify_invalid_token() {
        assert!(verify_token("invalid.token.here", SECRET).is_err());
    }

    #[test]
    fn test_non_uuid_subject_is_rejected() {
        let now = now_secs();
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            exp: now + 60,
            iat: now,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let err = get_user_id_from_token(&token, SECRET).unwrap_err();
        assert!(err.contains("Invalid user ID"));
    }
}
