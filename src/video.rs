//! Video room provider client.
//!
//! Thin REST wrapper over the video provider (Daily): room creation, room
//! lookup by name, and meeting-token issuance. Responses are relayed to
//! callers as provider-shaped JSON, so this client deals in
//! [`serde_json::Value`] rather than typed room structs.
//!
//! Handlers depend on the [`VideoApi`] trait so tests can substitute a
//! mock without any network traffic.

use async_trait::async_trait;
use serde_json::Value;

/// Meeting-token lifetime in seconds (one hour).
const TOKEN_TTL_SECS: i64 = 60 * 60;

/// Errors raised by the video provider client.
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    /// The request never produced a provider response, or the response
    /// body could not be read.
    #[error("video request failed: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("video provider error ({status}): {message}")]
    Api {
        /// HTTP status returned by the provider.
        status: u16,
        /// Error detail extracted from the provider body.
        message: String,
        /// Full provider error body, relayed to callers verbatim.
        details: Option<Value>,
    },
}

impl VideoError {
    /// Whether the provider rejected a room creation because the name is
    /// already taken. Create collapses into a fetch in that case.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Api { message, .. } if message.contains("already exists"))
    }

    /// HTTP status to relay to the caller (500 when the provider never
    /// answered).
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Api { status, .. } => *status,
            Self::Transport(_) => 500,
        }
    }
}

/// Parameters for a meeting-token request.
///
/// `room_name` must already be sanitized so it matches the name under
/// which the room was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingTokenRequest {
    /// Sanitized room name the token grants access to.
    pub room_name: String,
    /// Participant display name.
    pub user_name: String,
    /// Whether the participant joins with owner privileges.
    pub is_owner: bool,
}

/// Capability interface for the video room provider.
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Creates a private room with the given (sanitized) name.
    async fn create_room(&self, name: &str) -> Result<Value, VideoError>;

    /// Fetches an existing room by its (sanitized) name.
    async fn get_room(&self, name: &str) -> Result<Value, VideoError>;

    /// Issues a meeting token for a participant in a room.
    async fn create_meeting_token(&self, request: &MeetingTokenRequest)
    -> Result<String, VideoError>;
}

/// Video API client for the Daily REST API (bearer-token authorization).
pub struct DailyClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl DailyClient {
    /// Creates a client for the given API base URL and key.
    ///
    /// # Errors
    ///
    /// Returns [`VideoError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, VideoError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| VideoError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, VideoError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| VideoError::Transport(e.to_string()))?;
        Self::read_response(resp).await
    }

    async fn get(&self, path: &str) -> Result<Value, VideoError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| VideoError::Transport(e.to_string()))?;
        Self::read_response(resp).await
    }

    async fn read_response(resp: reqwest::Response) -> Result<Value, VideoError> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .map_err(|e| VideoError::Transport(e.to_string()));
        }

        let details: Option<Value> = resp.json().await.ok();
        let message = details
            .as_ref()
            .and_then(error_detail)
            .unwrap_or_else(|| status.to_string());
        Err(VideoError::Api {
            status: status.as_u16(),
            message,
            details,
        })
    }
}

/// Extracts the provider's error detail: the `info` field if present,
/// else `error`.
fn error_detail(body: &Value) -> Option<String> {
    body.get("info")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl VideoApi for DailyClient {
    async fn create_room(&self, name: &str) -> Result<Value, VideoError> {
        let body = serde_json::json!({
            "name": name,
            "privacy": "private",
            "properties": {
                "enable_screenshare": false,
                "enable_chat": false,
                "enable_knocking": false,
                "enable_recording": false,
            },
        });
        self.post("/rooms", &body).await
    }

    async fn get_room(&self, name: &str) -> Result<Value, VideoError> {
        self.get(&format!("/rooms/{name}")).await
    }

    async fn create_meeting_token(
        &self,
        request: &MeetingTokenRequest,
    ) -> Result<String, VideoError> {
        let exp = chrono::Utc::now().timestamp() + TOKEN_TTL_SECS;
        let body = serde_json::json!({
            "properties": {
                "room_name": request.room_name,
                "user_name": request.user_name,
                "is_owner": request.is_owner,
                "exp": exp,
                "enable_screenshare": false,
                "enable_chat": false,
            },
        });
        let value = self.post("/meeting-tokens", &body).await?;
        value
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                VideoError::Transport("token missing from provider response".to_string())
            })
    }
}
