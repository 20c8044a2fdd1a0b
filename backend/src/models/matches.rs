use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Pending,
    Matched,
    Expired,
    Closed,
}

/// The durable record created once both sides of a tenant/landlord/property
/// triple have expressed LIKE. At most one non-CLOSED match exists per
/// `(tenant_id, property_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub landlord_id: Uuid,
    pub property_id: Uuid,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    /// When the tenant first wrote into the thread. Once set, the response
    /// deadline is inert regardless of elapsed time.
    pub tenant_first_reply_at: Option<DateTime<Utc>>,
    /// Set at the MATCHED transition; meaningful only until the tenant's
    /// first reply is recorded.
    pub response_deadline: Option<DateTime<Utc>>,
}

impl Match {
    pub fn is_party(&self, actor_id: Uuid) -> bool {
        self.tenant_id == actor_id || self.landlord_id == actor_id
    }

    /// The other side of the match, from `actor_id`'s point of view.
    pub fn counterparty(&self, actor_id: Uuid) -> Option<Uuid> {
        if actor_id == self.tenant_id {
            Some(self.landlord_id)
        } else if actor_id == self.landlord_id {
            Some(self.tenant_id)
        } else {
            None
        }
    }

    pub fn seconds_left(&self, now: DateTime<Utc>) -> i64 {
        match self.response_deadline {
            Some(deadline) => (deadline - now).num_seconds().max(0),
            None => 0,
        }
    }
}

/// Countdown metadata the chat screen polls alongside the thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInfo {
    pub match_id: Uuid,
    pub status: MatchStatus,
    pub time_left_seconds: i64,
    pub tenant_messaged: bool,
}

/// One row of the tenant/landlord conversation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub match_id: Uuid,
    pub counterparty_name: String,
    pub property_title: String,
    pub status: MatchStatus,
    pub last_message: Option<String>,
    pub unread_count: usize,
    pub updated_at: DateTime<Utc>,
}
