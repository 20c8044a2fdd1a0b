use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

use crate::error::{ClientError, CoreError};
use crate::models::{ChatMessage, MatchInfo, MatchOutcome, Property, Role, SwipeDirection, User};
use crate::store::CoreStore;

/// Everything a chat session needs from the backend. One implementation
/// speaks HTTP; the in-process one backs tests and embedded use.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_messages(&self, match_id: Uuid) -> Result<Vec<ChatMessage>, ClientError>;
    async fn send_message(&self, match_id: Uuid, text: &str) -> Result<ChatMessage, ClientError>;
    async fn mark_read(&self, match_id: Uuid) -> Result<(), ClientError>;
    async fn match_info(&self, match_id: Uuid) -> Result<MatchInfo, ClientError>;

    async fn propose_viewing(&self, match_id: Uuid, date_time: DateTime<Utc>) -> Result<ChatMessage, ClientError>;
    async fn accept_viewing(&self, match_id: Uuid) -> Result<ChatMessage, ClientError>;
    async fn decline_viewing(&self, match_id: Uuid) -> Result<ChatMessage, ClientError>;
    async fn send_rent_proposal(&self, match_id: Uuid, price: f64, lease_start: NaiveDate) -> Result<ChatMessage, ClientError>;
    async fn pay_rent(&self, match_id: Uuid) -> Result<ChatMessage, ClientError>;
    async fn decline_rent(&self, match_id: Uuid) -> Result<ChatMessage, ClientError>;
}

/// Parses an ISO-8601 date-time before anything goes on the wire.
pub fn parse_date_time(iso: &str) -> Result<DateTime<Utc>, ClientError> {
    // Accept both full RFC 3339 and the naive "2026-03-15T14:00:00" form
    // the mobile pickers produce.
    if let Ok(dt) = DateTime::parse_from_rfc3339(iso) {
        return Ok(dt.with_timezone(&Utc));
    }
    iso.parse::<chrono::NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|_| ClientError::Validation(format!("invalid date-time, expected ISO-8601: {iso}")))
}

pub fn parse_date(iso: &str) -> Result<NaiveDate, ClientError> {
    iso.parse::<NaiveDate>()
        .map_err(|_| ClientError::Validation(format!("invalid date, expected YYYY-MM-DD: {iso}")))
}

fn check_price(price: f64) -> Result<(), ClientError> {
    if price > 0.0 {
        Ok(())
    } else {
        Err(ClientError::Validation("price must be positive".into()))
    }
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// Reqwest-backed transport for one authenticated actor. The actor id rides
/// in the `x-actor-id` header on every call.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    actor_id: Uuid,
}

impl HttpApi {
    pub fn new(base_url: &str, actor_id: Uuid) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            actor_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(ClientError::Api { status: status.as_u16(), message })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self
            .client
            .get(self.url(path))
            .header("x-actor-id", self.actor_id.to_string())
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T, ClientError> {
        let response = self
            .client
            .post(self.url(path))
            .header("x-actor-id", self.actor_id.to_string())
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    // --- Operations outside the chat loop (swipe deck, registries) ---

    pub async fn register_user(&self, name: &str, role: Role) -> Result<User, ClientError> {
        self.post("/api/users", json!({ "name": name, "role": role })).await
    }

    pub async fn register_property(&self, title: &str) -> Result<Property, ClientError> {
        self.post("/api/properties", json!({ "title": title })).await
    }

    pub async fn swipe(
        &self,
        role: Role,
        candidate_id: Uuid,
        property_id: Option<Uuid>,
        direction: SwipeDirection,
    ) -> Result<MatchOutcome, ClientError> {
        self.post(
            "/api/swipes",
            json!({
                "role": role,
                "candidate_id": candidate_id,
                "property_id": property_id,
                "direction": direction,
            }),
        )
        .await
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn fetch_messages(&self, match_id: Uuid) -> Result<Vec<ChatMessage>, ClientError> {
        self.get(&format!("/api/chats/{match_id}/messages")).await
    }

    async fn send_message(&self, match_id: Uuid, text: &str) -> Result<ChatMessage, ClientError> {
        self.post(&format!("/api/chats/{match_id}/messages"), json!({ "text": text })).await
    }

    async fn mark_read(&self, match_id: Uuid) -> Result<(), ClientError> {
        let response = self
            .client
            .put(self.url(&format!("/api/chats/{match_id}/read")))
            .header("x-actor-id", self.actor_id.to_string())
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            Err(ClientError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("mark read failed").to_string(),
            })
        }
    }

    async fn match_info(&self, match_id: Uuid) -> Result<MatchInfo, ClientError> {
        self.get(&format!("/api/chats/{match_id}/info")).await
    }

    async fn propose_viewing(&self, match_id: Uuid, date_time: DateTime<Utc>) -> Result<ChatMessage, ClientError> {
        self.post(
            &format!("/api/chats/{match_id}/viewing/propose"),
            json!({ "date": date_time.to_rfc3339() }),
        )
        .await
    }

    async fn accept_viewing(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
        self.post(&format!("/api/chats/{match_id}/viewing/accept"), json!({})).await
    }

    async fn decline_viewing(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
        self.post(&format!("/api/chats/{match_id}/viewing/decline"), json!({})).await
    }

    async fn send_rent_proposal(&self, match_id: Uuid, price: f64, lease_start: NaiveDate) -> Result<ChatMessage, ClientError> {
        check_price(price)?;
        self.post(
            &format!("/api/chats/{match_id}/rent/propose"),
            json!({ "price": price, "start_date": lease_start.to_string() }),
        )
        .await
    }

    async fn pay_rent(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
        self.post(&format!("/api/chats/{match_id}/rent/pay"), json!({})).await
    }

    async fn decline_rent(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
        self.post(&format!("/api/chats/{match_id}/rent/decline"), json!({})).await
    }
}

// ---------------------------------------------------------------------------
// In-process transport
// ---------------------------------------------------------------------------

/// Drives the store directly, skipping the network. The session code cannot
/// tell the difference, which is what makes the sync engine testable.
#[derive(Clone)]
pub struct LocalApi {
    store: CoreStore,
    actor_id: Uuid,
}

impl LocalApi {
    pub fn new(store: CoreStore, actor_id: Uuid) -> Self {
        Self { store, actor_id }
    }
}

fn core_to_client(err: CoreError) -> ClientError {
    ClientError::Api {
        status: err.status().as_u16(),
        message: err.to_string(),
    }
}

#[async_trait]
impl ChatApi for LocalApi {
    async fn fetch_messages(&self, match_id: Uuid) -> Result<Vec<ChatMessage>, ClientError> {
        self.store.list_messages(match_id, self.actor_id).await.map_err(core_to_client)
    }

    async fn send_message(&self, match_id: Uuid, text: &str) -> Result<ChatMessage, ClientError> {
        self.store
            .send_message(match_id, self.actor_id, text, Utc::now())
            .await
            .map_err(core_to_client)
    }

    async fn mark_read(&self, match_id: Uuid) -> Result<(), ClientError> {
        self.store
            .mark_read(match_id, self.actor_id, Utc::now())
            .await
            .map(|_| ())
            .map_err(core_to_client)
    }

    async fn match_info(&self, match_id: Uuid) -> Result<MatchInfo, ClientError> {
        self.store
            .get_match_info(match_id, self.actor_id, Utc::now())
            .await
            .map_err(core_to_client)
    }

    async fn propose_viewing(&self, match_id: Uuid, date_time: DateTime<Utc>) -> Result<ChatMessage, ClientError> {
        self.store
            .propose_viewing(match_id, self.actor_id, date_time, Utc::now())
            .await
            .map_err(core_to_client)
    }

    async fn accept_viewing(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
        self.store.accept_viewing(match_id, self.actor_id, Utc::now()).await.map_err(core_to_client)
    }

    async fn decline_viewing(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
        self.store.decline_viewing(match_id, self.actor_id, Utc::now()).await.map_err(core_to_client)
    }

    async fn send_rent_proposal(&self, match_id: Uuid, price: f64, lease_start: NaiveDate) -> Result<ChatMessage, ClientError> {
        check_price(price)?;
        self.store
            .send_rent_proposal(match_id, self.actor_id, price, lease_start, Utc::now())
            .await
            .map_err(core_to_client)
    }

    async fn pay_rent(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
        self.store.pay_rent(match_id, self.actor_id, Utc::now()).await.map_err(core_to_client)
    }

    async fn decline_rent(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
        self.store.decline_rent(match_id, self.actor_id, Utc::now()).await.map_err(core_to_client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_time_parsing_accepts_both_wire_forms() {
        assert!(parse_date_time("2026-03-15T14:00:00").is_ok());
        assert!(parse_date_time("2026-03-15T14:00:00Z").is_ok());
        assert!(parse_date_time("2026-03-15T14:00:00+02:00").is_ok());
        assert!(matches!(parse_date_time("next tuesday"), Err(ClientError::Validation(_))));
    }

    #[test]
    fn price_and_date_are_validated_before_any_network_call() {
        assert!(matches!(check_price(0.0), Err(ClientError::Validation(_))));
        assert!(matches!(check_price(-10.0), Err(ClientError::Validation(_))));
        assert!(check_price(450.0).is_ok());
        assert!(parse_date("2026-04-01").is_ok());
        assert!(matches!(parse_date("04/01/2026"), Err(ClientError::Validation(_))));
    }
}
