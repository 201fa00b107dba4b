//! Relay server core: shared state, JSON handlers, and API error mapping.
//!
//! Every endpoint is a pass-through: accept a JSON body, optionally
//! sanitize a string, forward to the push or video provider, relay the
//! response or error back. The only state is the per-role token registry.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};

use crate::push::{MulticastMessage, PushGateway};
use crate::registry::{Role, TokenStore};
use crate::sanitize;
use crate::video::{MeetingTokenRequest, VideoApi, VideoError};

/// Shared relay server state: the token registry and the provider clients.
pub struct AppState {
    /// Per-role device-token registry.
    pub tokens: Arc<dyn TokenStore>,
    /// Push provider gateway.
    pub push: Arc<dyn PushGateway>,
    /// Video room provider API.
    pub video: Arc<dyn VideoApi>,
}

/// Errors a handler can surface to the caller as an HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A required request field is missing or empty.
    #[error("{0}")]
    Validation(String),

    /// The request body could not be parsed as JSON.
    #[error("invalid JSON body: {details}")]
    InvalidBody {
        /// Status from the body rejection (400 for parse errors, 413 for
        /// oversized bodies, 415 for a wrong content type).
        status: StatusCode,
        /// Parser detail, relayed to the caller.
        details: String,
    },

    /// The video provider rejected or failed the forwarded call.
    #[error(transparent)]
    Video(#[from] VideoError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": message })),
            )
                .into_response(),
            Self::InvalidBody { status, details } => (
                status,
                Json(json!({
                    "success": false,
                    "error": "Invalid JSON format",
                    "details": details,
                })),
            )
                .into_response(),
            Self::Video(err) => {
                let status = StatusCode::from_u16(err.status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let (message, details) = match err {
                    VideoError::Api {
                        message, details, ..
                    } => (message, details),
                    other => (other.to_string(), None),
                };
                (
                    status,
                    Json(json!({
                        "success": false,
                        "error": message,
                        "details": details,
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// Unwraps a JSON body, mapping rejections to [`ApiError::InvalidBody`].
///
/// Field-level deserialization failures (422 from axum) are reported as
/// plain 400 parse errors; size and content-type rejections keep their
/// own status.
fn extract<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            let status = match rejection.status() {
                StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
                other => other,
            };
            Err(ApiError::InvalidBody {
                status,
                details: rejection.body_text(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct RegisterRequest {
    token: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct NotifyRequest {
    title: Option<String>,
    body: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomRequest {
    room_name: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTokenRequest {
    room_name: Option<String>,
    user_name: Option<String>,
    is_owner: Option<bool>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn register_walker(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    register(&state, Role::Walker, payload).await
}

async fn register_owner(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    register(&state, Role::Owner, payload).await
}

/// Records a device token in the role's registry. Set semantics make
/// repeated registration a no-op.
async fn register(
    state: &AppState,
    role: Role,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = extract(payload)?;
    let token = request.token.unwrap_or_default();
    if token.is_empty() {
        return Err(ApiError::Validation("Token is required".to_string()));
    }

    let added = state.tokens.add(role, &token).await;
    let prefix: String = token.chars().take(12).collect();
    tracing::info!(role = role.as_str(), token = %prefix, added, "token registered");

    Ok(Json(json!({ "success": true })))
}

async fn notify_walkers(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    notify(&state, Role::Walker, payload).await
}

async fn notify_owners(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    notify(&state, Role::Owner, payload).await
}

/// Fans a notification out to every registered token of a role in one
/// multicast provider call.
///
/// Provider failures are absorbed into a 200 envelope with
/// `success: false` — existing app builds check the embedded flag, not
/// the HTTP status.
async fn notify(
    state: &AppState,
    role: Role,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = extract(payload)?;

    let tokens = state.tokens.list(role).await;
    if tokens.is_empty() {
        return Ok(Json(json!({
            "success": false,
            "message": role.no_recipients_message(),
        })));
    }

    let message = MulticastMessage {
        title: request
            .title
            .unwrap_or_else(|| role.default_title().to_string()),
        body: request
            .body
            .unwrap_or_else(|| role.default_body().to_string()),
        tokens,
    };

    match state.push.send_multicast(&message).await {
        Ok(sent) => {
            tracing::info!(role = role.as_str(), sent, "notification sent");
            Ok(Json(json!({ "success": true, "sent": sent })))
        }
        Err(err) => {
            tracing::error!(role = role.as_str(), error = %err, "notification failed");
            Ok(Json(json!({ "success": false, "error": err.to_string() })))
        }
    }
}

/// Debugging endpoint: lists all registered tokens per role.
async fn list_tokens(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "walkers": state.tokens.list(Role::Walker).await,
        "owners": state.tokens.list(Role::Owner).await,
    }))
}

/// Creates a private video room under the sanitized name.
///
/// When the provider reports the name as already taken, the call
/// collapses into a fetch of the existing room. Clients must use the
/// returned `sanitizedRoomName` for subsequent token requests.
async fn create_room(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = extract(payload)?;
    let raw = request.room_name.unwrap_or_default();
    if raw.is_empty() {
        return Err(ApiError::Validation("Room name is required".to_string()));
    }

    let name = sanitize::room_name(&raw);
    tracing::info!(room = %name, "creating video room");

    let room = match state.video.create_room(&name).await {
        Ok(room) => room,
        Err(err) if err.is_already_exists() => {
            tracing::info!(room = %name, "room already exists, fetching existing");
            state.video.get_room(&name).await?
        }
        Err(err) => return Err(err.into()),
    };

    Ok(Json(json!({
        "success": true,
        "room": room,
        "sanitizedRoomName": name,
    })))
}

/// Issues a meeting token for a participant in a room.
///
/// The room name is sanitized with the same rule as room creation, so a
/// raw name passed to both endpoints resolves to the same room.
async fn create_token(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateTokenRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = extract(payload)?;
    let raw = request.room_name.unwrap_or_default();
    if raw.is_empty() {
        return Err(ApiError::Validation("Room name is required".to_string()));
    }

    let is_owner = request.is_owner.unwrap_or(false);
    let token_request = MeetingTokenRequest {
        room_name: sanitize::room_name(&raw),
        user_name: sanitize::display_name(request.user_name.as_deref(), is_owner),
        is_owner,
    };
    tracing::info!(
        room = %token_request.room_name,
        user = %token_request.user_name,
        "creating meeting token"
    );

    let token = state.video.create_meeting_token(&token_request).await?;
    Ok(Json(json!({ "success": true, "token": token })))
}

/// Health check endpoint for cloud platforms.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

// ---------------------------------------------------------------------------
// Server startup
// ---------------------------------------------------------------------------

/// Builds the relay router with all endpoints wired to the shared state.
pub fn router(state: Arc<AppState>, max_body_size: usize) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/register-walker", post(register_walker))
        .route("/register-owner", post(register_owner))
        .route("/notify-walkers", post(notify_walkers))
        .route("/notify-owners", post(notify_owners))
        .route("/tokens", get(list_tokens))
        .route("/create-daily-room", post(create_room))
        .route("/create-daily-token", post(create_token))
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}

/// Starts the relay server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    state: Arc<AppState>,
    max_body_size: usize,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state, max_body_size);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::PushError;
    use crate::registry::MemoryTokenStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Push gateway mock that records every multicast it receives.
    #[derive(Default)]
    struct MockPush {
        fail: bool,
        calls: AtomicUsize,
        sent: Mutex<Vec<MulticastMessage>>,
    }

    #[async_trait]
    impl PushGateway for MockPush {
        async fn send_multicast(&self, message: &MulticastMessage) -> Result<u32, PushError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PushError::Provider {
                    status: 401,
                    message: "invalid server key".to_string(),
                });
            }
            let count = u32::try_from(message.tokens.len()).unwrap();
            self.sent.lock().unwrap().push(message.clone());
            Ok(count)
        }
    }

    /// Video API mock with configurable create behavior.
    #[derive(Default)]
    struct MockVideo {
        already_exists: bool,
        create_error: Option<(u16, String)>,
        created: Mutex<Vec<String>>,
        fetched: Mutex<Vec<String>>,
        token_requests: Mutex<Vec<MeetingTokenRequest>>,
    }

    #[async_trait]
    impl VideoApi for MockVideo {
        async fn create_room(&self, name: &str) -> Result<Value, VideoError> {
            self.created.lock().unwrap().push(name.to_string());
            if let Some((status, message)) = &self.create_error {
                return Err(VideoError::Api {
                    status: *status,
                    message: message.clone(),
                    details: Some(json!({ "error": message })),
                });
            }
            if self.already_exists {
                return Err(VideoError::Api {
                    status: 400,
                    message: format!("a room named {name} already exists"),
                    details: None,
                });
            }
            Ok(json!({ "name": name, "privacy": "private" }))
        }

        async fn get_room(&self, name: &str) -> Result<Value, VideoError> {
            self.fetched.lock().unwrap().push(name.to_string());
            Ok(json!({ "name": name, "privacy": "private", "existing": true }))
        }

        async fn create_meeting_token(
            &self,
            request: &MeetingTokenRequest,
        ) -> Result<String, VideoError> {
            self.token_requests.lock().unwrap().push(request.clone());
            Ok("mock-meeting-token".to_string())
        }
    }

    struct TestRelay {
        base_url: String,
        client: reqwest::Client,
        push: Arc<MockPush>,
        video: Arc<MockVideo>,
    }

    /// Spawns the real server on an OS-assigned port with mock providers.
    async fn spawn_relay(push: MockPush, video: MockVideo) -> TestRelay {
        let push = Arc::new(push);
        let video = Arc::new(video);
        let state = Arc::new(AppState {
            tokens: Arc::new(MemoryTokenStore::new()),
            push: Arc::clone(&push) as Arc<dyn PushGateway>,
            video: Arc::clone(&video) as Arc<dyn VideoApi>,
        });

        let (addr, _handle) = start_server("127.0.0.1:0", state, 1024 * 1024)
            .await
            .unwrap();
        TestRelay {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            push,
            video,
        }
    }

    impl TestRelay {
        async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
            let resp = self
                .client
                .post(format!("{}{path}", self.base_url))
                .json(&body)
                .send()
                .await
                .unwrap();
            let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
            (status, resp.json().await.unwrap())
        }

        async fn get(&self, path: &str) -> (StatusCode, Value) {
            let resp = self
                .client
                .get(format!("{}{path}", self.base_url))
                .send()
                .await
                .unwrap();
            let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
            (status, resp.json().await.unwrap())
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;
        let (status, body) = relay.get("/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn register_then_list_tokens() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        let (status, body) = relay
            .post("/register-walker", json!({ "token": "abc" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let (status, body) = relay.get("/tokens").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "walkers": ["abc"], "owners": [] }));
    }

    #[tokio::test]
    async fn duplicate_registration_leaves_count_unchanged() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        relay
            .post("/register-owner", json!({ "token": "abc" }))
            .await;
        relay
            .post("/register-owner", json!({ "token": "abc" }))
            .await;

        let (_, body) = relay.get("/tokens").await;
        assert_eq!(body["owners"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn register_without_token_rejected() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        let (status, body) = relay.post("/register-walker", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Token is required");

        let (status, _) = relay
            .post("/register-walker", json!({ "token": "" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn notify_with_no_recipients_short_circuits() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        let (status, body) = relay.post("/notify-owners", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "success": false, "message": "No owners registered" })
        );
        // The provider must not be called.
        assert_eq!(relay.push.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn notify_multicasts_to_all_tokens_with_defaults() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        relay
            .post("/register-walker", json!({ "token": "w1" }))
            .await;
        relay
            .post("/register-walker", json!({ "token": "w2" }))
            .await;

        let (status, body) = relay.post("/notify-walkers", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["sent"], 2);

        let sent = relay.push.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "New Walk Request");
        assert_eq!(sent[0].body, "Someone is looking for a walker!");
        let mut tokens = sent[0].tokens.clone();
        tokens.sort();
        assert_eq!(tokens, vec!["w1".to_string(), "w2".to_string()]);
    }

    #[tokio::test]
    async fn notify_caller_title_and_body_take_precedence() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        relay
            .post("/register-owner", json!({ "token": "o1" }))
            .await;
        let (_, body) = relay
            .post(
                "/notify-owners",
                json!({ "title": "Walk done", "body": "Rex is home" }),
            )
            .await;
        assert_eq!(body["success"], true);

        let sent = relay.push.sent.lock().unwrap();
        assert_eq!(sent[0].title, "Walk done");
        assert_eq!(sent[0].body, "Rex is home");
    }

    #[tokio::test]
    async fn notify_provider_failure_absorbed_into_envelope() {
        let push = MockPush {
            fail: true,
            ..Default::default()
        };
        let relay = spawn_relay(push, MockVideo::default()).await;

        relay
            .post("/register-walker", json!({ "token": "w1" }))
            .await;
        let (status, body) = relay.post("/notify-walkers", json!({})).await;

        // HTTP 200 despite the failure; only the embedded flag reports it.
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .contains("invalid server key")
        );
    }

    #[tokio::test]
    async fn create_room_sanitizes_name_before_provider_call() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        let (status, body) = relay
            .post("/create-daily-room", json!({ "roomName": "Walk #1!" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["sanitizedRoomName"], "walk--1-");
        assert_eq!(body["room"]["name"], "walk--1-");

        let created = relay.video.created.lock().unwrap();
        assert_eq!(created.as_slice(), ["walk--1-"]);
    }

    #[tokio::test]
    async fn create_room_without_name_rejected() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        let (status, body) = relay.post("/create-daily-room", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Room name is required");
    }

    #[tokio::test]
    async fn create_room_already_exists_falls_back_to_fetch() {
        let video = MockVideo {
            already_exists: true,
            ..Default::default()
        };
        let relay = spawn_relay(MockPush::default(), video).await;

        let (status, body) = relay
            .post("/create-daily-room", json!({ "roomName": "walk-1" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["room"]["existing"], true);
        assert_eq!(body["sanitizedRoomName"], "walk-1");

        assert_eq!(relay.video.fetched.lock().unwrap().as_slice(), ["walk-1"]);
    }

    #[tokio::test]
    async fn create_room_provider_error_relays_status_and_details() {
        let video = MockVideo {
            create_error: Some((401, "invalid api key".to_string())),
            ..Default::default()
        };
        let relay = spawn_relay(MockPush::default(), video).await;

        let (status, body) = relay
            .post("/create-daily-room", json!({ "roomName": "walk-1" }))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "invalid api key");
        assert_eq!(body["details"], json!({ "error": "invalid api key" }));
    }

    #[tokio::test]
    async fn create_token_sanitizes_room_to_match_created_room() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        relay
            .post("/create-daily-room", json!({ "roomName": "Walk #1!" }))
            .await;
        let (status, body) = relay
            .post(
                "/create-daily-token",
                json!({ "roomName": "Walk #1!", "userName": "Alice", "isOwner": true }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "token": "mock-meeting-token" }));

        let requests = relay.video.token_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].room_name, relay.video.created.lock().unwrap()[0]);
        assert_eq!(requests[0].user_name, "Alice");
        assert!(requests[0].is_owner);
    }

    #[tokio::test]
    async fn create_token_defaults_display_name_by_owner_flag() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        relay
            .post("/create-daily-token", json!({ "roomName": "walk-1" }))
            .await;
        relay
            .post(
                "/create-daily-token",
                json!({ "roomName": "walk-1", "isOwner": true }),
            )
            .await;

        let requests = relay.video.token_requests.lock().unwrap();
        assert_eq!(requests[0].user_name, "Walker");
        assert!(!requests[0].is_owner);
        assert_eq!(requests[1].user_name, "Owner");
        assert!(requests[1].is_owner);
    }

    #[tokio::test]
    async fn create_token_without_room_rejected() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        let (status, body) = relay.post("/create-daily-token", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Room name is required");
    }

    #[tokio::test]
    async fn malformed_json_body_rejected_with_details() {
        let relay = spawn_relay(MockPush::default(), MockVideo::default()).await;

        let resp = relay
            .client
            .post(format!("{}/register-walker", relay.base_url))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid JSON format");
        assert!(body["details"].is_string());
    }
}
