//! Push provider client.
//!
//! Notifications fan out through a single multicast call to the push
//! provider's HTTP endpoint. The provider credential (a server key) is
//! loaded once at startup from a local JSON secret file and never
//! reloaded.
//!
//! Handlers depend on the [`PushGateway`] trait so tests can substitute a
//! mock without any network traffic.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// One batched push message addressed to every token of a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastMessage {
    /// Notification title shown on the device.
    pub title: String,
    /// Notification body shown on the device.
    pub body: String,
    /// Device tokens to address, one provider call for all of them.
    pub tokens: Vec<String>,
}

/// Errors raised by the push provider client.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The request never produced a provider response.
    #[error("push request failed: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("push provider error ({status}): {message}")]
    Provider {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider error detail, verbatim.
        message: String,
    },
}

/// Errors raised while loading the push credential file.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to read the credential file.
    #[error("failed to read credential file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The credential file is not valid JSON or misses required fields.
    #[error("failed to parse credential file: {0}")]
    ParseJson(#[from] serde_json::Error),
}

/// Push provider service credentials, read from a local secret file.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PushCredentials {
    /// Server key presented to the provider as `Authorization: key=...`.
    pub server_key: String,
}

impl PushCredentials {
    /// Loads credentials from a JSON file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        let contents = std::fs::read_to_string(path).map_err(|e| CredentialError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Capability interface for the push provider.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Submits one multicast message and returns the provider's count of
    /// successful deliveries.
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<u32, PushError>;
}

/// Shape of the provider's multicast send response.
#[derive(Debug, serde::Deserialize)]
struct SendResponse {
    success: u32,
}

/// Push gateway backed by the FCM legacy HTTP send endpoint.
pub struct FcmGateway {
    endpoint: String,
    server_key: String,
    client: reqwest::Client,
}

impl FcmGateway {
    /// Creates a gateway for the given endpoint using the loaded credentials.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Transport`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, credentials: &PushCredentials) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| PushError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            server_key: credentials.server_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<u32, PushError> {
        let payload = serde_json::json!({
            "registration_ids": message.tokens,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PushError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: SendResponse = resp
            .json()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;
        Ok(body.success)
    }
}
