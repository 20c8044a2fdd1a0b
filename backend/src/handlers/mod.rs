pub mod chat;
pub mod swipes;
pub mod workflow;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::error::CoreError;
use crate::store::CoreStore;
use crate::utils::Config;

/// State shared by every handler.
pub type AppState = (CoreStore, Config);

/// Actor identity rides in the `x-actor-id` header; authentication
/// mechanics live outside this core, the header stands in for the resolved
/// principal.
pub fn actor_id(headers: &HeaderMap) -> Result<Uuid, CoreError> {
    headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Uuid>().ok())
        .ok_or_else(|| CoreError::Forbidden("missing or malformed x-actor-id header".into()))
}
