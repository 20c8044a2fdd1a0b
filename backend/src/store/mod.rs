pub mod ledger;
pub mod matches;
pub mod threads;
pub mod workflow;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::constants::DEFAULT_RESPONSE_WINDOW_SECS;
use crate::error::CoreError;
use crate::models::{ChatMessage, Match, Property, Role, SwipeDecision, User};

/// Everything the server holds authority over. All cross-entity mutations
/// (mirror check + match creation, message append + first-reply stamp,
/// card transition + match close) happen under one write guard, which is
/// what makes the idempotency keys hold under concurrent clients.
pub(crate) struct CoreState {
    pub users: HashMap<Uuid, User>,
    pub properties: HashMap<Uuid, Property>,
    /// One decision per side per (tenant, property) pair; last write wins.
    pub swipes: HashMap<(Role, Uuid, Uuid), SwipeDecision>,
    pub matches: HashMap<Uuid, Match>,
    /// Idempotency index: (tenant_id, property_id) -> current match id.
    pub match_index: HashMap<(Uuid, Uuid), Uuid>,
    pub threads: HashMap<Uuid, Vec<ChatMessage>>,
    /// Action-card message id -> the SYSTEM message that recorded its
    /// terminal outcome. Replayed transitions return this instead of erroring.
    pub card_outcomes: HashMap<Uuid, Uuid>,
    pub response_window: Duration,
}

/// Shared handle over the server core. Cheap to clone; one per process.
#[derive(Clone)]
pub struct CoreStore {
    inner: Arc<RwLock<CoreState>>,
}

impl CoreStore {
    pub fn new(response_window_secs: i64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CoreState {
                users: HashMap::new(),
                properties: HashMap::new(),
                swipes: HashMap::new(),
                matches: HashMap::new(),
                match_index: HashMap::new(),
                threads: HashMap::new(),
                card_outcomes: HashMap::new(),
                response_window: Duration::seconds(response_window_secs),
            })),
        }
    }

    pub(crate) async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, CoreState> {
        self.inner.read().await
    }

    pub(crate) async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, CoreState> {
        self.inner.write().await
    }

    // --- Registries (enough for permission checks and listings) ---

    pub async fn register_user(&self, name: &str, role: Role, now: DateTime<Utc>) -> Result<User, CoreError> {
        if name.trim().is_empty() {
            return Err(CoreError::Validation("user name is required".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            role,
            created_at: now,
        };
        self.write().await.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub async fn register_property(
        &self,
        landlord_id: Uuid,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<Property, CoreError> {
        if title.trim().is_empty() {
            return Err(CoreError::Validation("property title is required".into()));
        }
        let mut state = self.write().await;
        match state.users.get(&landlord_id) {
            Some(user) if user.role == Role::Landlord => {}
            Some(_) => return Err(CoreError::Forbidden("only landlords can list properties".into())),
            None => return Err(CoreError::NotFound(format!("user not found: {landlord_id}"))),
        }
        let property = Property {
            id: Uuid::new_v4(),
            landlord_id,
            title: title.trim().to_string(),
            created_at: now,
        };
        state.properties.insert(property.id, property.clone());
        Ok(property)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, CoreError> {
        self.read()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("user not found: {user_id}")))
    }
}

impl Default for CoreStore {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_WINDOW_SECS)
    }
}
