use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{Match, MatchInfo, MatchStatus};

use super::threads::append_system_locked;
use super::{CoreState, CoreStore};

/// Creates (or converges to) the match for a (tenant, property) pair.
/// Detection and matching are atomic, so PENDING is never observable: a new
/// row goes straight to MATCHED with its response deadline set.
pub(crate) fn create_match_locked(
    state: &mut CoreState,
    tenant_id: Uuid,
    landlord_id: Uuid,
    property_id: Uuid,
    now: DateTime<Utc>,
) -> Uuid {
    if let Some(&existing) = state.match_index.get(&(tenant_id, property_id)) {
        // At most one non-CLOSED match per pair; a closed one may be
        // superseded by a fresh mutual like.
        if state.matches.get(&existing).is_some_and(|m| m.status != MatchStatus::Closed) {
            return existing;
        }
    }

    let m = Match {
        id: Uuid::new_v4(),
        tenant_id,
        landlord_id,
        property_id,
        status: MatchStatus::Matched,
        created_at: now,
        tenant_first_reply_at: None,
        response_deadline: Some(now + state.response_window),
    };
    let id = m.id;
    state.match_index.insert((tenant_id, property_id), id);
    state.matches.insert(id, m);
    state.threads.entry(id).or_default();
    id
}

/// MATCHED -> EXPIRED when the window has lapsed with no tenant reply.
/// Idempotent, and inert once the tenant has messaged, however late it runs.
pub(crate) fn expire_if_due_locked(state: &mut CoreState, match_id: Uuid, now: DateTime<Utc>) {
    let Some(m) = state.matches.get(&match_id) else {
        return;
    };
    let due = m.status == MatchStatus::Matched
        && m.tenant_first_reply_at.is_none()
        && m.seconds_left(now) == 0;
    if !due {
        return;
    }
    if let Some(m) = state.matches.get_mut(&match_id) {
        m.status = MatchStatus::Expired;
    }
    append_system_locked(state, match_id, "⏰ Response time expired — this match is no longer active.", now);
    tracing::info!(%match_id, "match expired without a tenant reply");
}

impl CoreStore {
    /// Idempotent on (tenant_id, property_id): concurrent calls converge to
    /// the same row.
    pub async fn create_match(
        &self,
        tenant_id: Uuid,
        landlord_id: Uuid,
        property_id: Uuid,
        now: DateTime<Utc>,
    ) -> Match {
        let mut state = self.write().await;
        let id = create_match_locked(&mut state, tenant_id, landlord_id, property_id, now);
        state.matches[&id].clone()
    }

    pub async fn get_match(&self, match_id: Uuid) -> Result<Match, CoreError> {
        self.read()
            .await
            .matches
            .get(&match_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("match not found: {match_id}")))
    }

    pub async fn expire_if_due(&self, match_id: Uuid, now: DateTime<Utc>) -> Result<Match, CoreError> {
        let mut state = self.write().await;
        if !state.matches.contains_key(&match_id) {
            return Err(CoreError::NotFound(format!("match not found: {match_id}")));
        }
        expire_if_due_locked(&mut state, match_id, now);
        Ok(state.matches[&match_id].clone())
    }

    /// Countdown metadata for the chat screen. Runs the expiry check first,
    /// so polling clients always observe authoritative state.
    pub async fn get_match_info(
        &self,
        match_id: Uuid,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<MatchInfo, CoreError> {
        let mut state = self.write().await;
        let m = state
            .matches
            .get(&match_id)
            .ok_or_else(|| CoreError::NotFound(format!("match not found: {match_id}")))?;
        if !m.is_party(actor_id) {
            return Err(CoreError::Forbidden("actor is not party to this match".into()));
        }
        expire_if_due_locked(&mut state, match_id, now);

        let m = &state.matches[&match_id];
        let tenant_messaged = m.tenant_first_reply_at.is_some();
        let time_left_seconds = if m.status == MatchStatus::Matched && !tenant_messaged {
            m.seconds_left(now)
        } else {
            0
        };
        Ok(MatchInfo {
            match_id,
            status: m.status,
            time_left_seconds,
            tenant_messaged,
        })
    }

    /// Periodic sweep run by the server binary. Returns the ids expired on
    /// this pass.
    pub async fn expire_due_matches(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut state = self.write().await;
        let due: Vec<Uuid> = state
            .matches
            .values()
            .filter(|m| {
                m.status == MatchStatus::Matched
                    && m.tenant_first_reply_at.is_none()
                    && m.seconds_left(now) == 0
            })
            .map(|m| m.id)
            .collect();
        for id in &due {
            expire_if_due_locked(&mut state, *id, now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;
    use chrono::Duration;

    async fn matched_store() -> (CoreStore, Match) {
        let store = CoreStore::new(100);
        let now = Utc::now();
        let tenant = store.register_user("Ana", crate::models::Role::Tenant, now).await.unwrap();
        let landlord = store.register_user("Bo", crate::models::Role::Landlord, now).await.unwrap();
        let property = store.register_property(landlord.id, "Loft", now).await.unwrap();
        let m = store.create_match(tenant.id, landlord.id, property.id, now).await;
        (store, m)
    }

    #[tokio::test]
    async fn info_counts_down_then_expires_at_deadline() {
        let (store, m) = matched_store().await;
        let t0 = m.created_at;

        let info = store.get_match_info(m.id, m.tenant_id, t0 + Duration::seconds(40)).await.unwrap();
        assert_eq!(info.status, MatchStatus::Matched);
        assert_eq!(info.time_left_seconds, 60);
        assert!(!info.tenant_messaged);

        let info = store.get_match_info(m.id, m.tenant_id, t0 + Duration::seconds(101)).await.unwrap();
        assert_eq!(info.status, MatchStatus::Expired);
        assert_eq!(info.time_left_seconds, 0);
    }

    #[tokio::test]
    async fn expiry_appends_a_system_notice_and_is_idempotent() {
        let (store, m) = matched_store().await;
        let late = m.created_at + Duration::seconds(500);

        let first = store.expire_if_due(m.id, late).await.unwrap();
        assert_eq!(first.status, MatchStatus::Expired);
        let second = store.expire_if_due(m.id, late + Duration::seconds(1)).await.unwrap();
        assert_eq!(second.status, MatchStatus::Expired);

        let thread = store.list_messages(m.id, m.tenant_id).await.unwrap();
        let notices: Vec<_> = thread.iter().filter(|msg| msg.kind == MessageType::System).collect();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].sender_id.is_none());
    }

    #[tokio::test]
    async fn tenant_reply_makes_the_deadline_inert_even_for_late_sweeps() {
        let (store, m) = matched_store().await;
        let t0 = m.created_at;
        store
            .send_message(m.id, m.tenant_id, "hi, still available?", t0 + Duration::seconds(10))
            .await
            .unwrap();

        // Called well past the deadline: must not expire.
        let after = store.expire_if_due(m.id, t0 + Duration::seconds(10_000)).await.unwrap();
        assert_eq!(after.status, MatchStatus::Matched);

        let info = store.get_match_info(m.id, m.landlord_id, t0 + Duration::seconds(10_000)).await.unwrap();
        assert!(info.tenant_messaged);
        assert_eq!(info.time_left_seconds, 0);
        assert_eq!(info.status, MatchStatus::Matched);
    }

    #[tokio::test]
    async fn sweep_expires_only_due_matches() {
        let (store, m) = matched_store().await;
        let expired = store.expire_due_matches(m.created_at + Duration::seconds(50)).await;
        assert!(expired.is_empty());
        let expired = store.expire_due_matches(m.created_at + Duration::seconds(150)).await;
        assert_eq!(expired, vec![m.id]);
    }

    #[tokio::test]
    async fn info_is_forbidden_for_strangers() {
        let (store, m) = matched_store().await;
        let stranger = store
            .register_user("Eve", crate::models::Role::Tenant, Utc::now())
            .await
            .unwrap();
        let err = store.get_match_info(m.id, stranger.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }
}
