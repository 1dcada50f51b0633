use anyhow::{anyhow, Context, Result};
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use super::session::{SessionClient, SessionUser};
use super::store::SessionStore;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Deserialized response envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AuthData {
    token: String,
    user: SessionUser,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    user: SessionUser,
}

/// Client for the auth API. Issued sessions go through the session client,
/// which also supplies the bearer token for protected requests.
pub struct ApiClient<S: SessionStore> {
    client: Client,
    base_url: String,
    session: SessionClient<S>,
}

impl<S: SessionStore> ApiClient<S> {
    pub fn new(base_url: impl Into<String>, session: SessionClient<S>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            session,
        })
    }

    pub fn session(&self) -> &SessionClient<S> {
        &self.session
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<SessionUser> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "confirmPassword": confirm_password,
            "firstName": first_name,
            "lastName": last_name,
        });
        let auth: AuthData = send(
            self.client
                .post(format!("{}/api/auth/register", self.base_url))
                .json(&body),
        )
        .await?;
        self.session.persist(&auth.token, &auth.user)?;
        Ok(auth.user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionUser> {
        let body = serde_json::json!({ "email": email, "password": password });
        let auth: AuthData = send(
            self.client
                .post(format!("{}/api/auth/login", self.base_url))
                .json(&body),
        )
        .await?;
        self.session.persist(&auth.token, &auth.user)?;
        Ok(auth.user)
    }

    /// Fetch the authenticated user's profile. With no stored token the
    /// request goes out unauthenticated and the server rejects it
    /// uniformly.
    pub async fn profile(&self) -> Result<SessionUser> {
        let mut req = self.client.get(format!("{}/api/user/profile", self.base_url));
        if let Some(token) = self.session.current_token() {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let data: ProfileData = send(req).await?;
        Ok(data.user)
    }

    /// Logout is purely local token deletion; there is nothing to revoke
    /// server-side.
    pub fn logout(&self) -> Result<()> {
        self.session.clear()
    }
}

/// Send a request and unwrap the envelope. Transport faults and responses
/// that don't parse surface as a generic retryable message; a parsed
/// failure envelope keeps the server's message. The caller retries, we
/// don't.
async fn send<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T> {
    let response = req.send().await.context("network error, please retry")?;
    let status = response.status();
    let envelope: Envelope<T> = response
        .json()
        .await
        .context("network error, please retry")?;
    if !status.is_success() || !envelope.success {
        warn!(%status, message = %envelope.message, "request rejected");
        return Err(anyhow!(envelope.message));
    }
    envelope
        .data
        .ok_or_else(|| anyhow!("network error, please retry"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_success_and_failure_shapes() {
        let ok: Envelope<AuthData> = serde_json::from_str(
            r#"{
                "success": true,
                "message": "Login successful",
                "data": {
                    "token": "a.b.c",
                    "user": {"id": 1, "email": "a@b.com", "firstName": "Jo", "lastName": "Li"}
                }
            }"#,
        )
        .expect("success envelope");
        assert!(ok.success);
        assert_eq!(ok.data.expect("data").user.first_name, "Jo");

        let err: Envelope<AuthData> = serde_json::from_str(
            r#"{"success": false, "message": "Invalid email or password"}"#,
        )
        .expect("failure envelope");
        assert!(!err.success);
        assert!(err.data.is_none());
        assert_eq!(err.message, "Invalid email or password");
    }

    #[test]
    fn user_fields_ignore_server_extras() {
        // The server also sends createdAt/updatedAt; the shadow drops them.
        let user: SessionUser = serde_json::from_str(
            r#"{
                "id": 1,
                "email": "a@b.com",
                "firstName": "Jo",
                "lastName": "Li",
                "createdAt": "2026-08-04T12:00:00Z",
                "updatedAt": "2026-08-04T12:00:00Z"
            }"#,
        )
        .expect("deserialize");
        assert_eq!(user.last_name, "Li");
    }
}
