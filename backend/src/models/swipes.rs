use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::users::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwipeDirection {
    Like,
    Pass,
}

/// One directional decision by one actor on one candidate. Each side of a
/// `(tenant, property)` pair holds at most one decision; a later swipe on
/// the same pair overwrites the earlier one (last write wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeDecision {
    pub actor_id: Uuid,
    pub role: Role,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub direction: SwipeDirection,
    pub decided_at: DateTime<Utc>,
}

/// Result of recording a swipe: whether it completed a mutual LIKE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub matched: bool,
    pub match_id: Option<Uuid>,
}

impl MatchOutcome {
    pub fn unmatched() -> Self {
        Self { matched: false, match_id: None }
    }

    pub fn matched(match_id: Uuid) -> Self {
        Self { matched: true, match_id: Some(match_id) }
    }
}
