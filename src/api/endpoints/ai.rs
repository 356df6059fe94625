//! Assistant chat. Backends make blocking HTTP calls, so replies are
//! produced off the async runtime.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::assistant::{AssistantStatus, ChatReply};

/// `GET /api/ai/status`
pub async fn status(State(ctx): State<ApiContext>) -> Json<AssistantStatus> {
    Json(ctx.core.assistant().status())
}

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

/// `POST /api/ai/chat`
pub async fn chat(
    State(ctx): State<ApiContext>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let assistant = ctx.core.assistant();
    let reply = tokio::task::spawn_blocking(move || assistant.chat(&req.message))
        .await
        .map_err(|e| ApiError::Internal(format!("assistant task failed: {e}")))??;
    Ok(Json(reply))
}
