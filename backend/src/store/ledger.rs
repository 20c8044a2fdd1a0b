use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{MatchOutcome, Role, SwipeDecision, SwipeDirection};

use super::matches::create_match_locked;
use super::{CoreState, CoreStore};

impl CoreStore {
    /// Records one directional decision and detects mutual interest.
    ///
    /// For a tenant the candidate is a property; for a landlord the
    /// candidate is a tenant and `property_id` names which listing the
    /// invite is for. The decision upsert, the mirror lookup and the match
    /// creation all happen under one write guard, so a mutual-like pair
    /// creates exactly one match even under concurrent double-submission.
    pub async fn record_swipe(
        &self,
        actor_id: Uuid,
        role: Role,
        candidate_id: Uuid,
        property_id: Option<Uuid>,
        direction: SwipeDirection,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome, CoreError> {
        let mut state = self.write().await;

        let (tenant_id, property_id) = resolve_pair(&state, actor_id, role, candidate_id, property_id)?;
        let landlord_id = state
            .properties
            .get(&property_id)
            .map(|p| p.landlord_id)
            .ok_or_else(|| CoreError::NotFound(format!("property not found: {property_id}")))?;

        if tenant_id == landlord_id {
            return Err(CoreError::Forbidden("self-interaction is not allowed".into()));
        }

        // Last write wins for the (actor, candidate) pair. A PASS landing
        // after a LIKE overwrites the decision but never touches a match
        // that already exists.
        state.swipes.insert(
            (role, tenant_id, property_id),
            SwipeDecision {
                actor_id,
                role,
                tenant_id,
                property_id,
                direction,
                decided_at: now,
            },
        );

        if direction == SwipeDirection::Pass {
            return Ok(MatchOutcome::unmatched());
        }

        let mirror_role = match role {
            Role::Tenant => Role::Landlord,
            Role::Landlord => Role::Tenant,
        };
        let mirror_liked = state
            .swipes
            .get(&(mirror_role, tenant_id, property_id))
            .is_some_and(|d| d.direction == SwipeDirection::Like);

        if !mirror_liked {
            return Ok(MatchOutcome::unmatched());
        }

        let match_id = create_match_locked(&mut state, tenant_id, landlord_id, property_id, now);
        tracing::info!(%match_id, %tenant_id, %property_id, "mutual like detected");
        Ok(MatchOutcome::matched(match_id))
    }
}

/// Resolves a swipe to its (tenant, property) idempotency pair, enforcing
/// that the actor is allowed to act on the candidate at all.
fn resolve_pair(
    state: &CoreState,
    actor_id: Uuid,
    role: Role,
    candidate_id: Uuid,
    property_id: Option<Uuid>,
) -> Result<(Uuid, Uuid), CoreError> {
    let actor = state
        .users
        .get(&actor_id)
        .ok_or_else(|| CoreError::NotFound(format!("user not found: {actor_id}")))?;
    if actor.role != role {
        return Err(CoreError::Forbidden("actor role does not match declared role".into()));
    }

    match role {
        Role::Tenant => {
            // Candidate is the property being swiped on.
            if !state.properties.contains_key(&candidate_id) {
                return Err(CoreError::Forbidden("candidate is not visible to this actor".into()));
            }
            Ok((actor_id, candidate_id))
        }
        Role::Landlord => {
            // Candidate is the tenant; the invite is scoped to one listing.
            let property_id = property_id
                .ok_or_else(|| CoreError::Validation("property_id is required for landlord swipes".into()))?;
            let property = state
                .properties
                .get(&property_id)
                .ok_or_else(|| CoreError::NotFound(format!("property not found: {property_id}")))?;
            if property.landlord_id != actor_id {
                return Err(CoreError::Forbidden("not your property".into()));
            }
            match state.users.get(&candidate_id) {
                Some(user) if user.role == Role::Tenant => {}
                _ => return Err(CoreError::Forbidden("candidate is not visible to this actor".into())),
            }
            Ok((candidate_id, property_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchStatus;

    async fn seeded() -> (CoreStore, Uuid, Uuid, Uuid) {
        let store = CoreStore::new(60);
        let now = Utc::now();
        let tenant = store.register_user("Ana", Role::Tenant, now).await.unwrap();
        let landlord = store.register_user("Bo", Role::Landlord, now).await.unwrap();
        let property = store
            .register_property(landlord.id, "Sunny loft", now)
            .await
            .unwrap();
        (store, tenant.id, landlord.id, property.id)
    }

    #[tokio::test]
    async fn mutual_like_creates_exactly_one_match_in_either_order() {
        for tenant_first in [true, false] {
            let (store, tenant, landlord, property) = seeded().await;
            let now = Utc::now();

            let (first, second) = if tenant_first {
                (
                    store.record_swipe(tenant, Role::Tenant, property, None, SwipeDirection::Like, now),
                    store.record_swipe(landlord, Role::Landlord, tenant, Some(property), SwipeDirection::Like, now),
                )
            } else {
                (
                    store.record_swipe(landlord, Role::Landlord, tenant, Some(property), SwipeDirection::Like, now),
                    store.record_swipe(tenant, Role::Tenant, property, None, SwipeDirection::Like, now),
                )
            };

            let first = first.await.unwrap();
            assert!(!first.matched);
            let second = second.await.unwrap();
            assert!(second.matched);

            // Re-submitting the same LIKE converges to the same match.
            let replay = store
                .record_swipe(tenant, Role::Tenant, property, None, SwipeDirection::Like, now)
                .await
                .unwrap();
            assert_eq!(replay.match_id, second.match_id);

            let m = store.get_match(second.match_id.unwrap()).await.unwrap();
            assert_eq!(m.status, MatchStatus::Matched);
            assert_eq!(m.response_deadline, Some(now + chrono::Duration::seconds(60)));
        }
    }

    #[tokio::test]
    async fn concurrent_double_submission_creates_one_match() {
        let (store, tenant, landlord, property) = seeded().await;
        let now = Utc::now();
        store
            .record_swipe(landlord, Role::Landlord, tenant, Some(property), SwipeDirection::Like, now)
            .await
            .unwrap();

        let a = store.clone();
        let b = store.clone();
        let (ra, rb) = tokio::join!(
            a.record_swipe(tenant, Role::Tenant, property, None, SwipeDirection::Like, now),
            b.record_swipe(tenant, Role::Tenant, property, None, SwipeDirection::Like, now),
        );
        let (ra, rb) = (ra.unwrap(), rb.unwrap());
        assert!(ra.matched && rb.matched);
        assert_eq!(ra.match_id, rb.match_id);
    }

    #[tokio::test]
    async fn pass_never_creates_a_match() {
        let (store, tenant, landlord, property) = seeded().await;
        let now = Utc::now();
        store
            .record_swipe(tenant, Role::Tenant, property, None, SwipeDirection::Like, now)
            .await
            .unwrap();
        let outcome = store
            .record_swipe(landlord, Role::Landlord, tenant, Some(property), SwipeDirection::Pass, now)
            .await
            .unwrap();
        assert!(!outcome.matched);
    }

    #[tokio::test]
    async fn pass_after_like_overwrites_without_corrupting_the_match() {
        let (store, tenant, landlord, property) = seeded().await;
        let now = Utc::now();
        store
            .record_swipe(landlord, Role::Landlord, tenant, Some(property), SwipeDirection::Like, now)
            .await
            .unwrap();
        let matched = store
            .record_swipe(tenant, Role::Tenant, property, None, SwipeDirection::Like, now)
            .await
            .unwrap();
        let match_id = matched.match_id.unwrap();

        // UI never offers this, but the ledger must tolerate it.
        let outcome = store
            .record_swipe(tenant, Role::Tenant, property, None, SwipeDirection::Pass, now)
            .await
            .unwrap();
        assert!(!outcome.matched);
        assert_eq!(store.get_match(match_id).await.unwrap().status, MatchStatus::Matched);
    }

    #[tokio::test]
    async fn foreign_property_swipe_is_forbidden() {
        let (store, tenant, _landlord, property) = seeded().await;
        let now = Utc::now();
        let other = store.register_user("Cy", Role::Landlord, now).await.unwrap();
        let err = store
            .record_swipe(other.id, Role::Landlord, tenant, Some(property), SwipeDirection::Like, now)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }
}
