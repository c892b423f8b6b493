use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::error::{InferenceError, OrchestratorError};
use crate::types::{Message, ToolDeclaration};
use crate::Orchestrator;

const GENERIC_FAILURE: &str = "Failed to process request";

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/tools", get(list_tools))
        .with_state(orchestrator)
        .layer(cors)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    orchestrator: Arc<Orchestrator>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(orchestrator))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    "ok"
}

async fn list_tools(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Vec<ToolDeclaration>> {
    Json(orchestrator.tools().describe())
}

#[tracing::instrument(skip_all)]
async fn chat(
    State(orchestrator): State<Arc<Orchestrator>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection, "malformed chat request");
        ApiError::internal()
    })?;

    info!(messages = request.messages.len(), "chat request");
    let completion = orchestrator.complete(&request.messages).await?;
    info!(
        iterations = completion.iterations,
        input_tokens = completion.usage.input_tokens,
        output_tokens = completion.usage.output_tokens,
        "chat response"
    );
    Ok(Json(completion.response))
}

/// `{error: ...}` with a non-2xx status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<Value>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.error }))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Inference(InferenceError::ApiError { status, body }) => {
                warn!(status, body = %body, "provider rejected request");
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                // Relay the provider's own `error` field when it sent one.
                let error = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| v.get("error").cloned())
                    .filter(is_present)
                    .unwrap_or_else(|| Value::from("API request failed"));
                Self::new(status, error)
            }
            other => {
                error!(error = %other, "chat turn failed");
                Self::internal()
            }
        }
    }
}

/// Null, `false`, zero and the empty string carry no message.
fn is_present(error: &Value) -> bool {
    match error {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
