//! HTTP gateway for RelayClaw.
//!
//! Exposes the Twilio-shaped WhatsApp webhook plus a small REST surface
//! for testing and session management. Built on Axum; one shared state
//! holds the agent loop and the session store.

use std::sync::Arc;

use axum::extract::{Form, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use relayclaw_agent::AgentLoop;
use relayclaw_config::AppConfig;
use relayclaw_core::error::SessionError;
use relayclaw_core::message::Message;
use relayclaw_core::session::SessionStore;
use relayclaw_session::InMemorySessionStore;

/// Reply used whenever a turn fails for reasons the user can't act on.
const GENERIC_ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub agent: Arc<AgentLoop>,
    pub sessions: Arc<InMemorySessionStore>,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .route("/api/chat", post(api_chat_handler))
        .route("/api/chat/history/{user_id}", get(history_handler))
        .route("/api/chat/clear/{user_id}", delete(clear_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let client = relayclaw_providers::from_config(&config)?;
    let sessions = Arc::new(InMemorySessionStore::new(
        std::env::var("GITHUB_TOKEN").ok(),
        config.channel.history_window,
    ));
    let agent = Arc::new(AgentLoop::new(Arc::new(client), config.clone()));

    let state = Arc::new(GatewayState {
        config,
        agent,
        sessions,
    });
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The result of one chat turn through the gateway.
struct ChatTurn {
    reply: String,
    history_len: usize,
    has_credential: bool,
}

/// Run one agent turn for `user_id`, updating the session around it.
async fn run_chat(
    state: &GatewayState,
    user_id: &str,
    message: &str,
) -> Result<ChatTurn, SessionError> {
    let session = state.sessions.get_or_create(user_id).await?;
    let history = state
        .sessions
        .window(user_id, state.config.channel.history_window)
        .await?;
    state
        .sessions
        .append(user_id, Message::user(message))
        .await?;

    let outcome = state
        .agent
        .run_turn(&history, message, session.credential.as_deref())
        .await;
    let reply =
        relayclaw_format::postprocess(&outcome.text, state.config.channel.max_message_length);

    state
        .sessions
        .append(user_id, Message::model(reply.clone()))
        .await?;
    let history_len = state.sessions.window(user_id, usize::MAX).await?.len();

    Ok(ChatTurn {
        reply,
        history_len,
        has_credential: session.credential.is_some(),
    })
}

// --- Webhook (Twilio WhatsApp) ---

#[derive(Debug, Deserialize)]
struct WebhookForm {
    #[serde(default, rename = "Body")]
    body: String,
    #[serde(default, rename = "From")]
    from: String,
}

async fn webhook_handler(
    State(state): State<SharedState>,
    Form(form): Form<WebhookForm>,
) -> Response {
    let message = form.body.trim();
    let sender = form.from.trim();

    if message.is_empty() || sender.is_empty() {
        warn!("Webhook request missing message or sender");
        return twiml("Error: Message or sender information missing.");
    }

    info!(sender, "Webhook message received");

    match run_chat(&state, sender, message).await {
        Ok(turn) => twiml(&turn.reply),
        Err(e) => {
            error!(error = %e, "Webhook turn failed");
            twiml(GENERIC_ERROR_REPLY)
        }
    }
}

/// Wrap a message in a TwiML `<Response>` document.
fn twiml(message: &str) -> Response {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        escape_xml(message)
    );
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// --- REST API ---

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default = "default_api_user")]
    user_id: String,
}

fn default_api_user() -> String {
    "api_user".to_string()
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    user_id: String,
    message_type: &'static str,
    chat_history_length: usize,
    has_credential: bool,
}

async fn api_chat_handler(
    State(state): State<SharedState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let message = request.message.trim();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Message is required"})),
        )
            .into_response();
    }

    info!(user_id = %request.user_id, "API chat message received");

    match run_chat(&state, &request.user_id, message).await {
        Ok(turn) => Json(ChatResponse {
            response: turn.reply,
            user_id: request.user_id,
            message_type: "ai_response",
            chat_history_length: turn.history_len,
            has_credential: turn.has_credential,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "API chat turn failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": GENERIC_ERROR_REPLY})),
            )
                .into_response()
        }
    }
}

async fn history_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.sessions.get(&user_id).await {
        Some(session) => Json(json!({
            "user_id": user_id,
            "chat_history": session.history.messages,
            "has_credential": session.credential.is_some(),
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "User session not found"})),
        )
            .into_response(),
    }
}

async fn clear_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Response {
    if state.sessions.get(&user_id).await.is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "User session not found"})),
        )
            .into_response();
    }

    match state.sessions.clear(&user_id, true).await {
        Ok(()) => {
            info!(user_id = %user_id, "Chat history cleared");
            Json(json!({"message": "Chat history cleared", "user_id": user_id})).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to clear chat history");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error"})),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "relayclaw",
        "services": {
            "completion": "initialized",
            "tool_providers": state.config.enabled_providers().count(),
        }
    }))
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "message": "RelayClaw API is running",
        "status": "operational",
        "endpoints": {
            "webhook": "/webhook (POST) - Twilio webhook",
            "api_chat": "/api/chat (POST) - API endpoint for testing",
            "chat_history": "/api/chat/history/{user_id} (GET) - Get chat history",
            "clear_history": "/api/chat/clear/{user_id} (DELETE) - Clear chat history",
            "health": "/health (GET) - Health check"
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use relayclaw_core::completion::{
        CompletionClient, CompletionReply, CompletionRequest,
    };
    use relayclaw_core::error::ProviderError;
    use tower::ServiceExt;

    /// Client that answers every sample with the same satisfied text.
    struct FixedClient(String);

    #[async_trait]
    impl CompletionClient for FixedClient {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionReply, ProviderError> {
            Ok(CompletionReply {
                text: Some(format!("{} [SATISFIED]", self.0)),
                function_calls: vec![],
            })
        }
    }

    fn test_app(reply: &str) -> Router {
        let config = AppConfig::default();
        let agent = Arc::new(AgentLoop::new(
            Arc::new(FixedClient(reply.to_string())),
            config.clone(),
        ));
        let sessions = Arc::new(InMemorySessionStore::new(
            None,
            config.channel.history_window,
        ));
        build_router(Arc::new(GatewayState {
            config,
            agent,
            sessions,
        }))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let app = test_app("hi");
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("healthy"));
    }

    #[tokio::test]
    async fn root_lists_endpoints() {
        let app = test_app("hi");
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("/webhook"));
    }

    #[tokio::test]
    async fn webhook_answers_twiml() {
        let app = test_app("Hello there");
        let response = app
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("Body=hi&From=whatsapp%3A%2B15551234"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/xml"
        );
        let body = body_string(response).await;
        assert!(body.contains("<Response><Message>Hello there</Message></Response>"));
    }

    #[tokio::test]
    async fn webhook_missing_sender_is_twiml_error() {
        let app = test_app("hi");
        let response = app
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("Body=hi"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("information missing"));
    }

    #[tokio::test]
    async fn api_chat_rejects_empty_message() {
        let app = test_app("hi");
        let response = app
            .oneshot(
                Request::post("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn api_chat_roundtrip_tracks_history() {
        let app = test_app("Sure thing");
        let response = app
            .oneshot(
                Request::post("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "hello", "user_id": "tester"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["response"], "Sure thing");
        assert_eq!(parsed["chat_history_length"], 2);
        assert_eq!(parsed["user_id"], "tester");
    }

    #[tokio::test]
    async fn history_unknown_user_is_404() {
        let app = test_app("hi");
        let response = app
            .oneshot(
                Request::get("/api/chat/history/nobody")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clear_unknown_user_is_404() {
        let app = test_app("hi");
        let response = app
            .oneshot(
                Request::delete("/api/chat/clear/nobody")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn xml_escaping_covers_markup() {
        assert_eq!(
            escape_xml("a < b & c > \"d\""),
            "a &lt; b &amp; c &gt; &quot;d&quot;"
        );
    }
}
