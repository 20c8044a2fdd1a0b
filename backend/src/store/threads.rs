use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::constants::is_valid_message_text;
use crate::error::CoreError;
use crate::models::{
    messages::thread_order, ChatMessage, ConversationSummary, Match, MatchStatus, MessageType, Role,
};

use super::{CoreState, CoreStore};

pub(crate) fn append_system_locked(
    state: &mut CoreState,
    match_id: Uuid,
    text: &str,
    now: DateTime<Utc>,
) -> ChatMessage {
    let msg = ChatMessage {
        id: Uuid::new_v4(),
        match_id,
        sender_id: None,
        kind: MessageType::System,
        text: text.to_string(),
        metadata: None,
        created_at: now,
        read_at: None,
    };
    state.threads.entry(match_id).or_default().push(msg.clone());
    msg
}

pub(crate) fn party_match_locked(
    state: &CoreState,
    match_id: Uuid,
    actor_id: Uuid,
) -> Result<Match, CoreError> {
    let m = state
        .matches
        .get(&match_id)
        .ok_or_else(|| CoreError::NotFound(format!("match not found: {match_id}")))?;
    if !m.is_party(actor_id) {
        return Err(CoreError::Forbidden("actor is not party to this match".into()));
    }
    Ok(m.clone())
}

impl CoreStore {
    /// Full thread snapshot in (created_at, id) order.
    pub async fn list_messages(&self, match_id: Uuid, actor_id: Uuid) -> Result<Vec<ChatMessage>, CoreError> {
        let state = self.read().await;
        party_match_locked(&state, match_id, actor_id)?;
        let mut thread = state.threads.get(&match_id).cloned().unwrap_or_default();
        thread.sort_by(thread_order);
        Ok(thread)
    }

    /// Appends a TEXT message. The tenant's first message stamps
    /// `tenant_first_reply_at`, which permanently disarms the response
    /// deadline.
    pub async fn send_message(
        &self,
        match_id: Uuid,
        sender_id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, CoreError> {
        if !is_valid_message_text(text) {
            return Err(CoreError::Validation("message text must be non-empty".into()));
        }
        let mut state = self.write().await;
        let m = party_match_locked(&state, match_id, sender_id)?;
        if m.status == MatchStatus::Expired {
            return Err(CoreError::Conflict("this match has expired".into()));
        }

        let msg = ChatMessage {
            id: Uuid::new_v4(),
            match_id,
            sender_id: Some(sender_id),
            kind: MessageType::Text,
            text: text.trim().to_string(),
            metadata: None,
            created_at: now,
            read_at: None,
        };
        state.threads.entry(match_id).or_default().push(msg.clone());

        if sender_id == m.tenant_id {
            if let Some(stored) = state.matches.get_mut(&match_id) {
                if stored.tenant_first_reply_at.is_none() {
                    stored.tenant_first_reply_at = Some(now);
                    tracing::debug!(%match_id, "tenant first reply recorded, countdown disarmed");
                }
            }
        }
        Ok(msg)
    }

    /// Flags every message not sent by the caller as read. Returns how many
    /// were newly flagged.
    pub async fn mark_read(&self, match_id: Uuid, actor_id: Uuid, now: DateTime<Utc>) -> Result<usize, CoreError> {
        let mut state = self.write().await;
        party_match_locked(&state, match_id, actor_id)?;
        let mut flagged = 0;
        if let Some(thread) = state.threads.get_mut(&match_id) {
            for msg in thread.iter_mut() {
                if !msg.is_from(actor_id) && msg.read_at.is_none() {
                    msg.read_at = Some(now);
                    flagged += 1;
                }
            }
        }
        Ok(flagged)
    }

    /// Conversation list rows for either side's chat screen.
    pub async fn conversations_for(&self, actor_id: Uuid, role: Role) -> Result<Vec<ConversationSummary>, CoreError> {
        let state = self.read().await;
        if !state.users.contains_key(&actor_id) {
            return Err(CoreError::NotFound(format!("user not found: {actor_id}")));
        }

        let mut rows: Vec<ConversationSummary> = state
            .matches
            .values()
            .filter(|m| match role {
                Role::Tenant => m.tenant_id == actor_id,
                Role::Landlord => m.landlord_id == actor_id,
            })
            .map(|m| {
                let counterparty = m.counterparty(actor_id).and_then(|id| state.users.get(&id));
                let thread = state.threads.get(&m.id);
                let mut sorted: Vec<ChatMessage> = thread.cloned().unwrap_or_default();
                sorted.sort_by(thread_order);
                let last = sorted.last();
                ConversationSummary {
                    match_id: m.id,
                    counterparty_name: counterparty.map(|u| u.name.clone()).unwrap_or_default(),
                    property_title: state
                        .properties
                        .get(&m.property_id)
                        .map(|p| p.title.clone())
                        .unwrap_or_default(),
                    status: m.status,
                    last_message: last.map(|msg| msg.text.clone()),
                    unread_count: sorted
                        .iter()
                        .filter(|msg| !msg.is_from(actor_id) && msg.read_at.is_none())
                        .count(),
                    updated_at: last.map(|msg| msg.created_at).unwrap_or(m.created_at),
                }
            })
            .collect();

        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }
}
