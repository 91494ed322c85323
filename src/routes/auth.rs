//! Request authentication: bearer JWTs for clients, a shared secret for the
//! batch trigger.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::models::job::OwnerRef;
use crate::routes::error::ApiError;

/// Header carrying the batch trigger secret.
pub const WORKER_SECRET_HEADER: &str = "x-worker-secret";

/// Claims expected in a client access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Principal that owns the jobs it creates.
    pub sub: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
}

/// Decode an HS256 token and check its signature and expiry.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// The authenticated caller, taken from `Authorization: Bearer <jwt>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub owner: OwnerRef,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthenticated("Missing Authorization header".into()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::Unauthenticated("Expected: Bearer <token>".into())
        })?;

        let claims = validate_token(token, &state.auth.jwt_secret)
            .map_err(|_| ApiError::Unauthenticated("Invalid or expired token".into()))?;

        if claims.sub.is_empty() {
            return Err(ApiError::Unauthenticated("Token has no subject".into()));
        }

        Ok(AuthUser {
            owner: OwnerRef::new(claims.sub),
        })
    }
}

/// Marker extractor proving the request came from the batch trigger.
#[derive(Debug, Clone, Copy)]
pub struct WorkerTrigger;

impl FromRequestParts<AppState> for WorkerTrigger {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(WORKER_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthenticated("Missing worker secret".into()))?;

        if presented != state.auth.worker_secret {
            tracing::warn!("Rejected batch trigger with wrong secret");
            return Err(ApiError::Unauthenticated("Invalid worker secret".into()));
        }
        Ok(WorkerTrigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(sub: &str, exp: i64, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn valid_token_yields_subject() {
        let exp = chrono::Utc::now().timestamp() + 600;
        let claims = validate_token(&token("alice", exp, "s3cret"), "s3cret").unwrap();
        assert_eq!(claims.sub, "alice");
    }

    #[test]
    fn wrong_secret_or_expired_token_fails() {
        let exp = chrono::Utc::now().timestamp() + 600;
        assert!(validate_token(&token("alice", exp, "one"), "two").is_err());

        let expired = chrono::Utc::now().timestamp() - 600;
        assert!(validate_token(&token("alice", expired, "s3cret"), "s3cret").is_err());
    }
}
