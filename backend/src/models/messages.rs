use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

/// Message type for conditional rendering in the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Regular user-typed message
    Text,
    /// Automated system notification (e.g. "Viewing Confirmed")
    System,
    /// Interactive card (viewing proposal, rent proposal)
    ActionCard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    ViewingProposal,
    RentProposal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionState {
    Pending,
    Accepted,
    Declined,
    Paid,
}

impl ActionState {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ActionState::Pending)
    }
}

/// Structured payload carried by an ACTION_CARD message. The `state` field
/// is updated in place for display; the SYSTEM message appended at each
/// transition is the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCardPayload {
    pub action: ActionKind,
    pub state: ActionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_start: Option<NaiveDate>,
}

impl ActionCardPayload {
    pub fn viewing(proposed_date_time: DateTime<Utc>) -> Self {
        Self {
            action: ActionKind::ViewingProposal,
            state: ActionState::Pending,
            proposed_date_time: Some(proposed_date_time),
            price: None,
            lease_start: None,
        }
    }

    pub fn rent(price: f64, lease_start: NaiveDate) -> Self {
        Self {
            action: ActionKind::RentProposal,
            state: ActionState::Pending,
            proposed_date_time: None,
            price: Some(price),
            lease_start: Some(lease_start),
        }
    }
}

/// One entry in a match's thread. Immutable once created except for
/// `read_at` and the display-only action-card `state`. A `sender_id` of
/// `None` marks a system message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub text: String,
    pub metadata: Option<ActionCardPayload>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn is_from(&self, actor_id: Uuid) -> bool {
        self.sender_id == Some(actor_id)
    }
}

/// Thread order: `created_at` ascending, message id as tie-break.
pub fn thread_order(a: &ChatMessage, b: &ChatMessage) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}
