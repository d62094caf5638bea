//! Identity-token verification for the control channel.
//!
//! Tokens are HS256 JWTs issued by the account platform. The signature is
//! verified against the shared issuer secret and `exp` is enforced, so a
//! caller cannot forge a `user_id` by hand-crafting an unsigned token.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// WebSocket close code sent when the handshake token fails verification,
/// distinguishable from a normal closure by the client.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Signature, expiry, or structural validation failed
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// The subject claim is missing or not a UUID
    #[error("token subject is not a valid user id: {0}")]
    InvalidSubject(String),
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Verify an identity token and return the user id from its subject claim.
pub fn verify_token(token: &str, secret: &str) -> Result<Uuid, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;

    Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidSubject(data.claims.sub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    const SECRET: &str = "test-issuer-secret";

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: usize,
    }

    fn make_token(sub: &str, exp: usize, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &TestClaims {
                sub: sub.to_string(),
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn test_valid_token_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = make_token(&user_id.to_string(), far_future(), SECRET);
        assert_eq!(verify_token(&token, SECRET).unwrap(), user_id);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = make_token(&Uuid::new_v4().to_string(), far_future(), "other-secret");
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        // Far enough in the past to clear the default leeway
        let exp = (chrono::Utc::now().timestamp() - 600) as usize;
        let token = make_token(&Uuid::new_v4().to_string(), exp, SECRET);
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let token = make_token("service-role", far_future(), SECRET);
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(AuthError::InvalidSubject(_))
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(verify_token("not.a.jwt", SECRET).is_err());
    }
}
