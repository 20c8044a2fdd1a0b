use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::ChatMessage;

use super::{actor_id, AppState};

#[derive(Debug, Deserialize)]
pub struct ProposeViewingRequest {
    /// ISO-8601 date-time, e.g. "2026-03-15T14:00:00"
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct RentProposalRequest {
    pub price: f64,
    /// ISO-8601 date, e.g. "2026-04-01"
    pub start_date: String,
}

fn parse_date_time(iso: &str) -> Result<DateTime<Utc>, CoreError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(iso) {
        return Ok(dt.with_timezone(&Utc));
    }
    iso.parse::<chrono::NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|_| CoreError::Validation(format!("invalid date format, use ISO-8601: {iso}")))
}

pub async fn propose_viewing(
    State((store, _config)): State<AppState>,
    Path(match_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<ProposeViewingRequest>,
) -> Result<Json<ChatMessage>, CoreError> {
    let actor = actor_id(&headers)?;
    let date_time = parse_date_time(&req.date)?;
    Ok(Json(store.propose_viewing(match_id, actor, date_time, Utc::now()).await?))
}

pub async fn accept_viewing(
    State((store, _config)): State<AppState>,
    Path(match_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ChatMessage>, CoreError> {
    let actor = actor_id(&headers)?;
    Ok(Json(store.accept_viewing(match_id, actor, Utc::now()).await?))
}

pub async fn decline_viewing(
    State((store, _config)): State<AppState>,
    Path(match_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ChatMessage>, CoreError> {
    let actor = actor_id(&headers)?;
    Ok(Json(store.decline_viewing(match_id, actor, Utc::now()).await?))
}

pub async fn send_rent_proposal(
    State((store, _config)): State<AppState>,
    Path(match_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<RentProposalRequest>,
) -> Result<Json<ChatMessage>, CoreError> {
    let actor = actor_id(&headers)?;
    let start = req
        .start_date
        .parse::<NaiveDate>()
        .map_err(|_| CoreError::Validation(format!("invalid start date, use YYYY-MM-DD: {}", req.start_date)))?;
    Ok(Json(store.send_rent_proposal(match_id, actor, req.price, start, Utc::now()).await?))
}

pub async fn pay_rent(
    State((store, _config)): State<AppState>,
    Path(match_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ChatMessage>, CoreError> {
    let actor = actor_id(&headers)?;
    Ok(Json(store.pay_rent(match_id, actor, Utc::now()).await?))
}

pub async fn decline_rent(
    State((store, _config)): State<AppState>,
    Path(match_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ChatMessage>, CoreError> {
    let actor = actor_id(&headers)?;
    Ok(Json(store.decline_rent(match_id, actor, Utc::now()).await?))
}
