use axum::{extract::State, http::HeaderMap, response::Json};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{MatchOutcome, Property, Role, SwipeDirection, User};

use super::{actor_id, AppState};

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPropertyRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct SwipeRequest {
    pub role: Role,
    pub candidate_id: Uuid,
    /// Which listing a landlord invite is scoped to; ignored for tenants.
    pub property_id: Option<Uuid>,
    pub direction: SwipeDirection,
}

pub async fn register_user(
    State((store, _config)): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<Json<User>, CoreError> {
    let user = store.register_user(&req.name, req.role, Utc::now()).await?;
    tracing::info!(user_id = %user.id, role = ?user.role, "user registered");
    Ok(Json(user))
}

pub async fn register_property(
    State((store, _config)): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterPropertyRequest>,
) -> Result<Json<Property>, CoreError> {
    let landlord = actor_id(&headers)?;
    let property = store.register_property(landlord, &req.title, Utc::now()).await?;
    Ok(Json(property))
}

pub async fn record_swipe(
    State((store, _config)): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SwipeRequest>,
) -> Result<Json<MatchOutcome>, CoreError> {
    let actor = actor_id(&headers)?;
    let outcome = store
        .record_swipe(actor, req.role, req.candidate_id, req.property_id, req.direction, Utc::now())
        .await?;
    Ok(Json(outcome))
}
