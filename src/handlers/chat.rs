use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{ConversationContext, Turn};
use crate::services::orchestrator::{self, ChatReply};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<Turn>,
}

// POST /api/chat
pub async fn process_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }

    let context = ConversationContext::new(payload.conversation_history);
    let reply = orchestrator::process_message(&state, message, context).await;
    Ok(Json(reply))
}
