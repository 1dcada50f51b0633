use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::auth::repo::User;
use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Identity claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub user_id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub iat: usize,
    pub exp: usize,
}

/// Why a token was rejected. Collapsed to one generic message at the API
/// boundary; only logs see the distinction.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    Signature,
}

/// Holds JWT signing and verification keys with the configured lifetime.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig { secret, ttl_hours } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_secs(ttl_hours as u64 * 3600),
        }
    }
}

impl JwtKeys {
    /// Mint a token for the user, expiring `ttl` from now.
    pub fn sign(&self, user: &User) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = TokenClaims {
            user_id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = user.id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding, &Validation::default())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::Signature,
                _ => TokenError::Malformed,
            })?;
        debug!(user_id = data.claims.user_id, "jwt verified");
        Ok(data.claims)
    }
}

/// Extracts and verifies the bearer token, yielding its claims.
#[derive(Debug)]
pub struct AuthUser(pub TokenClaims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Authentication("No token provided".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Authentication("No token provided".to_string()))?;

        let claims = keys.verify(token).map_err(|e| {
            warn!(reason = %e, "token rejected");
            ApiError::from(e)
        })?;

        Ok(AuthUser(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, Request};

    fn sample_user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: 7,
            email: "jo@example.com".into(),
            password_hash: "unused".into(),
            first_name: "Jo".into(),
            last_name: "Li".into(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn make_keys() -> JwtKeys {
        JwtKeys::from_ref(&AppState::test().await)
    }

    /// Token carrying the given exp, signed with the test secret.
    fn token_with_exp(exp_offset_secs: i64) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = TokenClaims {
            user_id: 7,
            email: "jo@example.com".into(),
            first_name: "Jo".into(),
            last_name: "Li".into(),
            iat: now as usize,
            exp: (now + exp_offset_secs) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .expect("encode")
    }

    #[tokio::test]
    async fn sign_and_verify_roundtrips_claims() {
        let keys = make_keys().await;
        let user = sample_user();
        let token = keys.sign(&user).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.first_name, user.first_name);
        assert_eq!(claims.last_name, user.last_name);
        assert_eq!(claims.exp, claims.iat + 24 * 3600);
    }

    #[tokio::test]
    async fn token_has_three_base64url_segments() {
        let keys = make_keys().await;
        let token = keys.sign(&sample_user()).expect("sign");
        assert_eq!(token.split('.').count(), 3);
    }

    #[tokio::test]
    async fn expired_token_is_rejected_as_expired() {
        let keys = make_keys().await;
        // Correctly signed, exp an hour in the past (beyond validation leeway).
        let token = token_with_exp(-3600);
        assert!(matches!(keys.verify(&token), Err(TokenError::Expired)));
    }

    #[tokio::test]
    async fn foreign_signature_is_rejected() {
        let keys = make_keys().await;
        let foreign = encode(
            &Header::default(),
            &TokenClaims {
                user_id: 7,
                email: "jo@example.com".into(),
                first_name: "Jo".into(),
                last_name: "Li".into(),
                iat: OffsetDateTime::now_utc().unix_timestamp() as usize,
                exp: (OffsetDateTime::now_utc().unix_timestamp() + 3600) as usize,
            },
            &EncodingKey::from_secret(b"some-other-secret"),
        )
        .expect("encode");
        assert!(matches!(keys.verify(&foreign), Err(TokenError::Signature)));
    }

    #[tokio::test]
    async fn garbage_is_rejected_as_malformed() {
        let keys = make_keys().await;
        assert!(matches!(keys.verify("nonsense"), Err(TokenError::Malformed)));
        assert!(matches!(
            keys.verify("only.two"),
            Err(TokenError::Malformed)
        ));
    }

    #[tokio::test]
    async fn extractor_rejects_missing_and_invalid_tokens() {
        let state = AppState::test().await;

        let (mut parts, ()) = Request::builder()
            .uri("/api/user/profile")
            .body(())
            .expect("request")
            .into_parts();
        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect_err("no header must be rejected");
        assert!(matches!(err, ApiError::Authentication(ref m) if m == "No token provided"));

        let (mut parts, ()) = Request::builder()
            .uri("/api/user/profile")
            .header(header::AUTHORIZATION, format!("Bearer {}", token_with_exp(-3600)))
            .body(())
            .expect("request")
            .into_parts();
        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect_err("expired token must be rejected");
        // Generic message only; the expiry detail never leaves the server.
        assert!(matches!(err, ApiError::Authentication(ref m) if m == "Invalid or expired token"));
    }

    #[tokio::test]
    async fn extractor_accepts_a_fresh_token() {
        let state = AppState::test().await;
        let keys = JwtKeys::from_ref(&state);
        let token = keys.sign(&sample_user()).expect("sign");

        let (mut parts, ()) = Request::builder()
            .uri("/api/user/profile")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(())
            .expect("request")
            .into_parts();
        let AuthUser(claims) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect("fresh token must pass");
        assert_eq!(claims.user_id, 7);
    }
}
