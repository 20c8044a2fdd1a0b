use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{ChatMessage, ConversationSummary, MatchInfo, Role};

use super::{actor_id, AppState};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

pub async fn tenant_conversations(
    State((store, _config)): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConversationSummary>>, CoreError> {
    let actor = actor_id(&headers)?;
    Ok(Json(store.conversations_for(actor, Role::Tenant).await?))
}

pub async fn landlord_conversations(
    State((store, _config)): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConversationSummary>>, CoreError> {
    let actor = actor_id(&headers)?;
    Ok(Json(store.conversations_for(actor, Role::Landlord).await?))
}

pub async fn match_info(
    State((store, _config)): State<AppState>,
    Path(match_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<MatchInfo>, CoreError> {
    let actor = actor_id(&headers)?;
    Ok(Json(store.get_match_info(match_id, actor, Utc::now()).await?))
}

pub async fn list_messages(
    State((store, _config)): State<AppState>,
    Path(match_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatMessage>>, CoreError> {
    let actor = actor_id(&headers)?;
    Ok(Json(store.list_messages(match_id, actor).await?))
}

pub async fn send_message(
    State((store, _config)): State<AppState>,
    Path(match_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ChatMessage>, CoreError> {
    let actor = actor_id(&headers)?;
    let message = store.send_message(match_id, actor, &req.text, Utc::now()).await?;
    Ok(Json(message))
}

pub async fn mark_read(
    State((store, _config)): State<AppState>,
    Path(match_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, CoreError> {
    let actor = actor_id(&headers)?;
    store.mark_read(match_id, actor, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}
