use anyhow::Result;
use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::store::SessionStore;

const TOKEN_KEY: &str = "token";
const USER_KEY: &str = "user";

/// Client-side shadow of the server user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Holds the current session in an injectable storage backend.
pub struct SessionClient<S: SessionStore> {
    store: S,
}

impl<S: SessionStore> SessionClient<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist a fresh session, replacing any prior one.
    pub fn persist(&self, token: &str, user: &SessionUser) -> Result<()> {
        let user_json = serde_json::to_string(user)?;
        self.store.set(TOKEN_KEY, token)?;
        self.store.set(USER_KEY, &user_json)?;
        Ok(())
    }

    pub fn current_token(&self) -> Option<String> {
        self.store.get(TOKEN_KEY)
    }

    /// Stored user record; unparseable stored JSON is treated as absent.
    pub fn current_user(&self) -> Option<SessionUser> {
        let raw = self.store.get(USER_KEY)?;
        serde_json::from_str(&raw).ok()
    }

    /// Local expiry check on the token's claims segment, no network round
    /// trip. The signature is not checked here (the client holds no
    /// secret); the server verifies it on every protected request.
    pub fn is_valid(&self) -> bool {
        let Some(token) = self.current_token() else {
            return false;
        };
        match decode_expiry(&token) {
            Some(exp) => OffsetDateTime::now_utc().unix_timestamp() < exp,
            None => false,
        }
    }

    /// Drop the session (logout). Idempotent.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(TOKEN_KEY)?;
        self.store.remove(USER_KEY)?;
        Ok(())
    }
}

/// Pull the `exp` claim out of a compact JWT without verifying it.
/// Anything that is not three base64url segments with a JSON payload
/// carrying `exp` counts as absent.
fn decode_expiry(token: &str) -> Option<i64> {
    let mut segments = token.split('.');
    let (_header, payload) = (segments.next()?, segments.next()?);
    segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    let bytes = Base64UrlUnpadded::decode_vec(payload).ok()?;
    let claims: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    Some(claims.exp)
}
