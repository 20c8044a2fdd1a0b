use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{ActionCardPayload, ActionKind, ActionState, ChatMessage, MatchStatus, MessageType};

use super::threads::{append_system_locked, party_match_locked};
use super::{CoreState, CoreStore};

/// Finds the most recent ACTION_CARD of `kind` in a thread.
fn latest_card_locked(state: &CoreState, match_id: Uuid, kind: ActionKind) -> Option<ChatMessage> {
    state.threads.get(&match_id).and_then(|thread| {
        thread
            .iter()
            .filter(|msg| {
                msg.kind == MessageType::ActionCard
                    && msg.metadata.as_ref().is_some_and(|p| p.action == kind)
            })
            .max_by_key(|msg| (msg.created_at, msg.id))
            .cloned()
    })
}

/// For a card already in a terminal state, returns the SYSTEM message that
/// recorded the outcome. Retried transitions get this back instead of an
/// error.
fn recorded_outcome_locked(state: &CoreState, card: &ChatMessage) -> Option<ChatMessage> {
    let outcome_id = state.card_outcomes.get(&card.id)?;
    state
        .threads
        .get(&card.match_id)?
        .iter()
        .find(|msg| msg.id == *outcome_id)
        .cloned()
}

/// Flips the display state on the original card and appends the SYSTEM
/// audit message for the transition.
fn settle_card_locked(
    state: &mut CoreState,
    card_id: Uuid,
    match_id: Uuid,
    new_state: ActionState,
    notice: &str,
    now: DateTime<Utc>,
) -> ChatMessage {
    if let Some(thread) = state.threads.get_mut(&match_id) {
        if let Some(card) = thread.iter_mut().find(|msg| msg.id == card_id) {
            if let Some(payload) = card.metadata.as_mut() {
                payload.state = new_state;
            }
        }
    }
    let outcome = append_system_locked(state, match_id, notice, now);
    state.card_outcomes.insert(card_id, outcome.id);
    outcome
}

fn format_viewing(dt: DateTime<Utc>) -> String {
    dt.format("%A, %b %-d at %-I:%M %p").to_string()
}

impl CoreStore {
    /// Either party may propose a viewing. Appends an ACTION_CARD with a
    /// pending VIEWING_PROPOSAL payload.
    pub async fn propose_viewing(
        &self,
        match_id: Uuid,
        proposer_id: Uuid,
        date_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, CoreError> {
        if date_time <= now {
            return Err(CoreError::Validation("viewing date must be in the future".into()));
        }
        let mut state = self.write().await;
        let m = party_match_locked(&state, match_id, proposer_id)?;
        if m.status != MatchStatus::Matched {
            return Err(CoreError::Conflict(format!(
                "cannot propose a viewing while the match is {:?}",
                m.status
            )));
        }

        let msg = ChatMessage {
            id: Uuid::new_v4(),
            match_id,
            sender_id: Some(proposer_id),
            kind: MessageType::ActionCard,
            text: "📅 Viewing Proposal".to_string(),
            metadata: Some(ActionCardPayload::viewing(date_time)),
            created_at: now,
            read_at: None,
        };
        state.threads.entry(match_id).or_default().push(msg.clone());
        Ok(msg)
    }

    pub async fn accept_viewing(&self, match_id: Uuid, actor_id: Uuid, now: DateTime<Utc>) -> Result<ChatMessage, CoreError> {
        self.respond_viewing(match_id, actor_id, true, now).await
    }

    pub async fn decline_viewing(&self, match_id: Uuid, actor_id: Uuid, now: DateTime<Utc>) -> Result<ChatMessage, CoreError> {
        self.respond_viewing(match_id, actor_id, false, now).await
    }

    /// PENDING -> ACCEPTED | DECLINED, counterparty only. A terminal card is
    /// left alone and the recorded outcome is returned (idempotent for
    /// retried network calls).
    async fn respond_viewing(
        &self,
        match_id: Uuid,
        actor_id: Uuid,
        accept: bool,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, CoreError> {
        let mut state = self.write().await;
        party_match_locked(&state, match_id, actor_id)?;

        let card = latest_card_locked(&state, match_id, ActionKind::ViewingProposal)
            .ok_or_else(|| CoreError::Conflict("no viewing proposal in this thread".into()))?;
        let payload = card.metadata.clone().unwrap_or_else(|| ActionCardPayload::viewing(now));

        if payload.state.is_terminal() {
            return recorded_outcome_locked(&state, &card)
                .ok_or_else(|| CoreError::Conflict("viewing proposal already settled".into()));
        }
        if card.sender_id == Some(actor_id) {
            return Err(CoreError::Forbidden("only the counterparty can respond to a viewing proposal".into()));
        }

        let (new_state, notice) = if accept {
            let when = payload.proposed_date_time.map(format_viewing).unwrap_or_default();
            (ActionState::Accepted, format!("✅ Viewing Confirmed for {when}"))
        } else {
            (ActionState::Declined, "❌ Viewing Declined".to_string())
        };
        Ok(settle_card_locked(&mut state, card.id, match_id, new_state, &notice, now))
    }

    /// Only the landlord can put terms on the table. Price must be positive.
    pub async fn send_rent_proposal(
        &self,
        match_id: Uuid,
        landlord_id: Uuid,
        price: f64,
        lease_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, CoreError> {
        if !(price > 0.0) {
            return Err(CoreError::Validation("price must be positive".into()));
        }
        let mut state = self.write().await;
        let m = party_match_locked(&state, match_id, landlord_id)?;
        if landlord_id != m.landlord_id {
            return Err(CoreError::Forbidden("only the landlord can send a rent proposal".into()));
        }
        if m.status != MatchStatus::Matched {
            return Err(CoreError::Conflict(format!(
                "cannot send a rent proposal while the match is {:?}",
                m.status
            )));
        }
        if latest_card_locked(&state, match_id, ActionKind::RentProposal)
            .and_then(|card| card.metadata)
            .is_some_and(|p| p.state == ActionState::Pending)
        {
            return Err(CoreError::Conflict("a rent proposal is already pending for this match".into()));
        }

        let msg = ChatMessage {
            id: Uuid::new_v4(),
            match_id,
            sender_id: Some(landlord_id),
            kind: MessageType::ActionCard,
            text: "💰 Rent Proposal".to_string(),
            metadata: Some(ActionCardPayload::rent(price, lease_start)),
            created_at: now,
            read_at: None,
        };
        state.threads.entry(match_id).or_default().push(msg.clone());
        Ok(msg)
    }

    pub async fn pay_rent(&self, match_id: Uuid, actor_id: Uuid, now: DateTime<Utc>) -> Result<ChatMessage, CoreError> {
        self.respond_rent(match_id, actor_id, true, now).await
    }

    pub async fn decline_rent(&self, match_id: Uuid, actor_id: Uuid, now: DateTime<Utc>) -> Result<ChatMessage, CoreError> {
        self.respond_rent(match_id, actor_id, false, now).await
    }

    /// PENDING -> PAID | DECLINED, tenant only. PAID is terminal and closes
    /// the match; payment capture itself happens elsewhere.
    async fn respond_rent(
        &self,
        match_id: Uuid,
        actor_id: Uuid,
        pay: bool,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, CoreError> {
        let mut state = self.write().await;
        let m = party_match_locked(&state, match_id, actor_id)?;
        if actor_id != m.tenant_id {
            return Err(CoreError::Forbidden("only the tenant can act on a rent proposal".into()));
        }

        let card = latest_card_locked(&state, match_id, ActionKind::RentProposal)
            .ok_or_else(|| CoreError::Conflict("no rent proposal in this thread".into()))?;
        let payload = card.metadata.clone().unwrap_or_else(|| ActionCardPayload::rent(0.0, now.date_naive()));

        if payload.state.is_terminal() {
            return recorded_outcome_locked(&state, &card)
                .ok_or_else(|| CoreError::Conflict("rent proposal already settled".into()));
        }

        let outcome = if pay {
            if let Some(stored) = state.matches.get_mut(&match_id) {
                stored.status = MatchStatus::Closed;
            }
            let start = payload.lease_start.map(|d| d.to_string()).unwrap_or_default();
            settle_card_locked(
                &mut state,
                card.id,
                match_id,
                ActionState::Paid,
                &format!("🏠 Rent paid — lease starts {start}. This match is now closed."),
                now,
            )
        } else {
            settle_card_locked(
                &mut state,
                card.id,
                match_id,
                ActionState::Declined,
                "Rent proposal declined.",
                now,
            )
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Match, Role};
    use chrono::Duration;

    async fn matched_store() -> (CoreStore, Match) {
        let store = CoreStore::new(3600);
        let now = Utc::now();
        let tenant = store.register_user("Ana", Role::Tenant, now).await.unwrap();
        let landlord = store.register_user("Bo", Role::Landlord, now).await.unwrap();
        let property = store.register_property(landlord.id, "Loft", now).await.unwrap();
        let m = store.create_match(tenant.id, landlord.id, property.id, now).await;
        (store, m)
    }

    fn card_state(thread: &[ChatMessage], card_id: Uuid) -> ActionState {
        thread
            .iter()
            .find(|msg| msg.id == card_id)
            .and_then(|msg| msg.metadata.as_ref())
            .map(|p| p.state)
            .unwrap()
    }

    #[tokio::test]
    async fn accept_viewing_flips_card_and_appends_system_audit() {
        let (store, m) = matched_store().await;
        let now = m.created_at;
        let when = now + Duration::days(3);

        let card = store.propose_viewing(m.id, m.landlord_id, when, now).await.unwrap();
        assert_eq!(card.kind, MessageType::ActionCard);
        assert_eq!(card.metadata.as_ref().unwrap().state, ActionState::Pending);

        let outcome = store.accept_viewing(m.id, m.tenant_id, now + Duration::seconds(5)).await.unwrap();
        assert_eq!(outcome.kind, MessageType::System);
        assert!(outcome.text.contains("Viewing Confirmed"));

        let thread = store.list_messages(m.id, m.tenant_id).await.unwrap();
        assert_eq!(card_state(&thread, card.id), ActionState::Accepted);

        // Retried accept is a no-op returning the same recorded outcome.
        let replay = store.accept_viewing(m.id, m.tenant_id, now + Duration::seconds(9)).await.unwrap();
        assert_eq!(replay.id, outcome.id);
        let thread = store.list_messages(m.id, m.tenant_id).await.unwrap();
        assert_eq!(card_state(&thread, card.id), ActionState::Accepted);
        assert_eq!(thread.iter().filter(|msg| msg.kind == MessageType::System).count(), 1);
    }

    #[tokio::test]
    async fn proposer_cannot_settle_their_own_viewing() {
        let (store, m) = matched_store().await;
        let now = m.created_at;
        store.propose_viewing(m.id, m.landlord_id, now + Duration::days(1), now).await.unwrap();
        let err = store.accept_viewing(m.id, m.landlord_id, now).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn declined_viewing_stays_declined() {
        let (store, m) = matched_store().await;
        let now = m.created_at;
        let card = store.propose_viewing(m.id, m.tenant_id, now + Duration::days(1), now).await.unwrap();
        store.decline_viewing(m.id, m.landlord_id, now).await.unwrap();

        // A late accept does not resurrect the card.
        let replay = store.accept_viewing(m.id, m.landlord_id, now + Duration::seconds(1)).await.unwrap();
        assert!(replay.text.contains("Declined"));
        let thread = store.list_messages(m.id, m.tenant_id).await.unwrap();
        assert_eq!(card_state(&thread, card.id), ActionState::Declined);
    }

    #[tokio::test]
    async fn paying_rent_closes_the_match_idempotently() {
        let (store, m) = matched_store().await;
        let now = m.created_at;
        let start = (now + Duration::days(30)).date_naive();

        let card = store.send_rent_proposal(m.id, m.landlord_id, 450.0, start, now).await.unwrap();
        let outcome = store.pay_rent(m.id, m.tenant_id, now).await.unwrap();
        assert_eq!(outcome.kind, MessageType::System);
        assert_eq!(store.get_match(m.id).await.unwrap().status, MatchStatus::Closed);

        let replay = store.pay_rent(m.id, m.tenant_id, now + Duration::seconds(2)).await.unwrap();
        assert_eq!(replay.id, outcome.id);

        let thread = store.list_messages(m.id, m.tenant_id).await.unwrap();
        assert_eq!(card_state(&thread, card.id), ActionState::Paid);
    }

    #[tokio::test]
    async fn only_the_tenant_can_pay() {
        let (store, m) = matched_store().await;
        let now = m.created_at;
        store
            .send_rent_proposal(m.id, m.landlord_id, 450.0, now.date_naive(), now)
            .await
            .unwrap();
        let err = store.pay_rent(m.id, m.landlord_id, now).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn rent_proposal_rejects_bad_price_and_wrong_sender() {
        let (store, m) = matched_store().await;
        let now = m.created_at;
        let err = store
            .send_rent_proposal(m.id, m.landlord_id, 0.0, now.date_naive(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = store
            .send_rent_proposal(m.id, m.tenant_id, 450.0, now.date_naive(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn second_pending_rent_proposal_conflicts() {
        let (store, m) = matched_store().await;
        let now = m.created_at;
        store
            .send_rent_proposal(m.id, m.landlord_id, 450.0, now.date_naive(), now)
            .await
            .unwrap();
        let err = store
            .send_rent_proposal(m.id, m.landlord_id, 500.0, now.date_naive(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }
}
