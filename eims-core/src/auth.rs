//! Signed login against the EIMS authentication endpoint.
//!
//! Every submission performs a fresh login; tokens are never cached, so an
//! expired token can at worst fail one attempt.
use reqwest::Client;
use serde_json::json;
use thiserror::Error;

use crate::config::Credentials;
use crate::sign::{signed_envelope, EnvelopeError, KeyError};

/// Longest error-body excerpt carried into errors and logs.
pub(crate) const MAX_ERROR_BODY: usize = 500;

/// Errors returned by the login call.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication rejected with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("authentication timed out")]
    Timeout,
    #[error("authentication connection failed: {0}")]
    Connection(String),
    #[error("authentication response carries no data.accessToken")]
    MissingToken,
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Encoding(#[from] crate::canonical::EncodingError),
}

impl From<EnvelopeError> for AuthError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Key(e) => AuthError::Key(e),
            EnvelopeError::Encoding(e) => AuthError::Encoding(e),
        }
    }
}

/// Truncate a response body to its leading `max` characters, respecting
/// char boundaries.
pub(crate) fn truncate_body(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}

/// EIMS authentication client.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: Client,
    login_url: String,
}

impl AuthClient {
    /// The HTTP client is shared with the submission path so timeout and TLS
    /// policy apply uniformly.
    pub fn new(http: Client, login_url: impl Into<String>) -> Self {
        Self {
            http,
            login_url: login_url.into(),
        }
    }

    /// Sign the credential payload and exchange it for a bearer token.
    ///
    /// # Errors
    /// Returns [`AuthError::Status`] for any non-2xx response (body excerpt
    /// included), [`AuthError::Timeout`]/[`AuthError::Connection`] for
    /// transport failures, and [`AuthError::MissingToken`] when a 2xx
    /// response lacks `data.accessToken`.
    pub async fn login(
        &self,
        credentials: &Credentials,
        private_key_pem: &[u8],
        certificate_pem: &[u8],
    ) -> Result<String, AuthError> {
        let request = json!({
            "clientId": credentials.client_id,
            "clientSecret": credentials.client_secret,
            "apikey": credentials.api_key,
            "tin": credentials.tin,
        });
        let envelope = signed_envelope(&request, private_key_pem, certificate_pem)?;

        let response = self
            .http
            .post(&self.login_url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Timeout
                } else {
                    AuthError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
                body: truncate_body(&body, MAX_ERROR_BODY),
            });
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&body).map_err(|_| AuthError::MissingToken)?;
        parsed
            .pointer("/data/accessToken")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or(AuthError::MissingToken)
    }
}
