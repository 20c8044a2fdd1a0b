use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::constants::{is_valid_message_text, ECHO_MATCH_SKEW_SECS, POLL_INTERVAL_SECS};
use crate::error::ClientError;
use crate::models::{messages::thread_order, ChatMessage, MatchInfo, MessageType};

use super::api::ChatApi;
use super::countdown::{run_countdown, ResponseWindow};

/// A locally-inserted, not-yet-confirmed message shown immediately on send.
#[derive(Debug, Clone)]
struct PendingEcho {
    temp_id: Uuid,
    text: String,
    sent_at: DateTime<Utc>,
}

/// One rendered thread row: server truth or a still-pending echo.
#[derive(Debug, Clone)]
pub struct ThreadEntry {
    pub message: ChatMessage,
    pub confirmed: bool,
}

#[derive(Default)]
pub(crate) struct SessionState {
    thread: Vec<ChatMessage>,
    pending: Vec<PendingEcho>,
    pub(crate) info: Option<MatchInfo>,
    pub(crate) window: ResponseWindow,
}

/// Client-side synchronization loop for one open match. Owns its polling
/// and countdown tasks; dropping (or `stop`ping) the session cancels both,
/// so no background fetch outlives the screen.
pub struct ChatSession {
    api: Arc<dyn ChatApi>,
    match_id: Uuid,
    me: Uuid,
    state: Arc<Mutex<SessionState>>,
    poller: Option<JoinHandle<()>>,
    countdown: Option<JoinHandle<()>>,
}

impl ChatSession {
    pub fn new(api: Arc<dyn ChatApi>, match_id: Uuid, me: Uuid) -> Self {
        Self {
            api,
            match_id,
            me,
            state: Arc::new(Mutex::new(SessionState::default())),
            poller: None,
            countdown: None,
        }
    }

    /// Starts the poll loop (fetch + mark-read + match-info every tick) and
    /// the 1-second display countdown. Idempotent while running.
    pub fn start(&mut self) {
        if self.poller.is_none() {
            let api = Arc::clone(&self.api);
            let state = Arc::clone(&self.state);
            let (match_id, me) = (self.match_id, self.me);
            self.poller = Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECS));
                loop {
                    interval.tick().await;
                    poll_tick(&api, match_id, me, &state).await;
                }
            }));
        }
        if self.countdown.is_none() {
            let api = Arc::clone(&self.api);
            let state = Arc::clone(&self.state);
            let match_id = self.match_id;
            self.countdown = Some(tokio::spawn(async move {
                run_countdown(api, match_id, state).await;
            }));
        }
    }

    /// Deterministically stops both background tasks. A response already in
    /// flight is discarded, never applied to a stopped session.
    pub fn stop(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
        if let Some(handle) = self.countdown.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_some()
    }

    /// One full synchronization pass, also used by `send` for the immediate
    /// post-send reconcile.
    pub async fn sync_now(&self) {
        poll_tick(&self.api, self.match_id, self.me, &self.state).await;
    }

    /// Optimistic send: the echo is visible in `snapshot()` before the
    /// network round trip. On success the thread is re-fetched so the echo
    /// is replaced by the confirmed message; on failure the echo is removed
    /// and the text rides back in the error for retry.
    pub async fn send(&self, text: &str) -> Result<ChatMessage, ClientError> {
        let text = text.trim().to_string();
        if !is_valid_message_text(&text) {
            return Err(ClientError::Validation("message text must be non-empty".into()));
        }

        let temp_id = Uuid::new_v4();
        {
            let mut state = self.state.lock().await;
            state.pending.push(PendingEcho {
                temp_id,
                text: text.clone(),
                sent_at: Utc::now(),
            });
        }

        match self.api.send_message(self.match_id, &text).await {
            Ok(confirmed) => {
                {
                    let mut state = self.state.lock().await;
                    state.pending.retain(|echo| echo.temp_id != temp_id);
                }
                self.sync_now().await;
                // If that fetch lost the race to a network failure, the
                // confirmed message is still server truth: merge it so
                // nothing the user sent can vanish.
                let mut state = self.state.lock().await;
                if !state.thread.iter().any(|m| m.id == confirmed.id) {
                    state.thread.push(confirmed.clone());
                    state.thread.sort_by(thread_order);
                }
                Ok(confirmed)
            }
            Err(source) => {
                let mut state = self.state.lock().await;
                state.pending.retain(|echo| echo.temp_id != temp_id);
                Err(ClientError::SendFailed {
                    text,
                    source: Box::new(source),
                })
            }
        }
    }

    /// The rendered thread: confirmed messages and still-pending echoes,
    /// merged in (created_at, id) order.
    pub async fn snapshot(&self) -> Vec<ThreadEntry> {
        let state = self.state.lock().await;
        let mut entries: Vec<ThreadEntry> = state
            .thread
            .iter()
            .map(|message| ThreadEntry {
                message: message.clone(),
                confirmed: true,
            })
            .collect();
        for echo in &state.pending {
            entries.push(ThreadEntry {
                message: ChatMessage {
                    id: echo.temp_id,
                    match_id: self.match_id,
                    sender_id: Some(self.me),
                    kind: MessageType::Text,
                    text: echo.text.clone(),
                    metadata: None,
                    created_at: echo.sent_at,
                    read_at: None,
                },
                confirmed: false,
            });
        }
        entries.sort_by(|a, b| thread_order(&a.message, &b.message));
        entries
    }

    pub async fn match_info(&self) -> Option<MatchInfo> {
        self.state.lock().await.info.clone()
    }

    /// Display countdown state, resynced from the server on every poll.
    pub async fn response_window(&self) -> ResponseWindow {
        self.state.lock().await.window
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One poll tick. A failed fetch leaves the previous snapshot untouched;
/// the next tick retries.
async fn poll_tick(api: &Arc<dyn ChatApi>, match_id: Uuid, me: Uuid, state: &Arc<Mutex<SessionState>>) {
    match api.fetch_messages(match_id).await {
        Ok(snapshot) => {
            let mut state = state.lock().await;
            let merged = reconcile(snapshot, &mut state.pending, me);
            state.thread = merged;
        }
        Err(err) => {
            tracing::warn!(%match_id, error = %err, "poll fetch failed, keeping previous snapshot");
        }
    }

    if let Err(err) = api.mark_read(match_id).await {
        tracing::warn!(%match_id, error = %err, "mark read failed");
    }

    match api.match_info(match_id).await {
        Ok(info) => {
            let mut state = state.lock().await;
            state.window = ResponseWindow::from_info(&info);
            state.info = Some(info);
        }
        Err(err) => {
            tracing::warn!(%match_id, error = %err, "match info fetch failed");
        }
    }
}

/// Merges a server snapshot with the optimistic echoes. An echo is resolved
/// (dropped) once the snapshot holds a message from the same sender with the
/// same text created at-or-after the echo's send time, allowing a small
/// clock skew; each confirmed message resolves at most one echo, so two
/// identical texts sent in quick succession need two confirmations.
fn reconcile(mut snapshot: Vec<ChatMessage>, pending: &mut Vec<PendingEcho>, me: Uuid) -> Vec<ChatMessage> {
    snapshot.sort_by(thread_order);

    let skew = chrono::Duration::seconds(ECHO_MATCH_SKEW_SECS);
    let mut consumed: HashSet<Uuid> = HashSet::new();
    pending.retain(|echo| {
        let counterpart = snapshot.iter().find(|m| {
            !consumed.contains(&m.id)
                && m.is_from(me)
                && m.kind == MessageType::Text
                && m.text == echo.text
                && m.created_at >= echo.sent_at - skew
        });
        match counterpart {
            Some(m) => {
                consumed.insert(m.id);
                false
            }
            None => true,
        }
    });
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::api::LocalApi;
    use crate::models::Role;
    use crate::store::CoreStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn message(me: Uuid, text: &str, at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            match_id: Uuid::new_v4(),
            sender_id: Some(me),
            kind: MessageType::Text,
            text: text.to_string(),
            metadata: None,
            created_at: at,
            read_at: None,
        }
    }

    fn echo(text: &str, at: DateTime<Utc>) -> PendingEcho {
        PendingEcho {
            temp_id: Uuid::new_v4(),
            text: text.to_string(),
            sent_at: at,
        }
    }

    #[test]
    fn echo_is_dropped_once_its_confirmation_arrives() {
        let me = Uuid::new_v4();
        let t0 = Utc::now();
        let mut pending = vec![echo("hello", t0)];
        let snapshot = vec![message(me, "hello", t0 + chrono::Duration::seconds(1))];

        let merged = reconcile(snapshot, &mut pending, me);
        assert!(pending.is_empty());
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn echo_survives_until_a_counterpart_exists() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let t0 = Utc::now();
        let mut pending = vec![echo("hello", t0)];

        // Same text from the other side, and an older message of mine:
        // neither is my confirmation.
        let snapshot = vec![
            message(other, "hello", t0 + chrono::Duration::seconds(1)),
            message(me, "hello", t0 - chrono::Duration::seconds(60)),
        ];
        let merged = reconcile(snapshot, &mut pending, me);
        assert_eq!(pending.len(), 1);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn identical_double_send_needs_two_confirmations() {
        let me = Uuid::new_v4();
        let t0 = Utc::now();
        let mut pending = vec![echo("ping", t0), echo("ping", t0 + chrono::Duration::milliseconds(100))];

        let snapshot = vec![message(me, "ping", t0 + chrono::Duration::seconds(1))];
        reconcile(snapshot.clone(), &mut pending, me);
        assert_eq!(pending.len(), 1, "one confirmation resolves exactly one echo");

        let snapshot = vec![
            snapshot[0].clone(),
            message(me, "ping", t0 + chrono::Duration::seconds(2)),
        ];
        reconcile(snapshot, &mut pending, me);
        assert!(pending.is_empty());
    }

    #[test]
    fn merged_thread_is_sorted() {
        let me = Uuid::new_v4();
        let t0 = Utc::now();
        let snapshot = vec![
            message(me, "b", t0 + chrono::Duration::seconds(2)),
            message(me, "a", t0),
        ];
        let merged = reconcile(snapshot, &mut Vec::new(), me);
        assert_eq!(merged[0].text, "a");
        assert_eq!(merged[1].text, "b");
    }

    async fn matched_pair() -> (CoreStore, Uuid, Uuid, Uuid) {
        let store = CoreStore::new(3600);
        let now = Utc::now();
        let tenant = store.register_user("Ana", Role::Tenant, now).await.unwrap();
        let landlord = store.register_user("Bo", Role::Landlord, now).await.unwrap();
        let property = store.register_property(landlord.id, "Loft", now).await.unwrap();
        let m = store.create_match(tenant.id, landlord.id, property.id, now).await;
        (store, m.id, tenant.id, landlord.id)
    }

    #[tokio::test]
    async fn send_then_sync_yields_the_message_exactly_once() {
        let (store, match_id, tenant, _) = matched_pair().await;
        let session = ChatSession::new(Arc::new(LocalApi::new(store, tenant)), match_id, tenant);

        session.send("hi there").await.unwrap();
        let entries = session.snapshot().await;
        let hits: Vec<_> = entries.iter().filter(|e| e.message.text == "hi there").collect();
        assert_eq!(hits.len(), 1, "no flicker-duplicate after reconciliation");
        assert!(hits[0].confirmed);
    }

    /// Transport with failure switches per operation, for failure-path
    /// coverage.
    struct FlakyApi {
        inner: LocalApi,
        fail_sends: AtomicBool,
        fail_fetches: AtomicBool,
    }

    impl FlakyApi {
        fn new(inner: LocalApi) -> Self {
            Self {
                inner,
                fail_sends: AtomicBool::new(false),
                fail_fetches: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ChatApi for FlakyApi {
        async fn fetch_messages(&self, match_id: Uuid) -> Result<Vec<ChatMessage>, ClientError> {
            if self.fail_fetches.load(Ordering::SeqCst) {
                return Err(ClientError::Api { status: 503, message: "unavailable".into() });
            }
            self.inner.fetch_messages(match_id).await
        }
        async fn send_message(&self, match_id: Uuid, text: &str) -> Result<ChatMessage, ClientError> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(ClientError::Api { status: 503, message: "unavailable".into() });
            }
            self.inner.send_message(match_id, text).await
        }
        async fn mark_read(&self, match_id: Uuid) -> Result<(), ClientError> {
            self.inner.mark_read(match_id).await
        }
        async fn match_info(&self, match_id: Uuid) -> Result<MatchInfo, ClientError> {
            self.inner.match_info(match_id).await
        }
        async fn propose_viewing(&self, match_id: Uuid, dt: DateTime<Utc>) -> Result<ChatMessage, ClientError> {
            self.inner.propose_viewing(match_id, dt).await
        }
        async fn accept_viewing(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
            self.inner.accept_viewing(match_id).await
        }
        async fn decline_viewing(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
            self.inner.decline_viewing(match_id).await
        }
        async fn send_rent_proposal(&self, match_id: Uuid, price: f64, start: chrono::NaiveDate) -> Result<ChatMessage, ClientError> {
            self.inner.send_rent_proposal(match_id, price, start).await
        }
        async fn pay_rent(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
            self.inner.pay_rent(match_id).await
        }
        async fn decline_rent(&self, match_id: Uuid) -> Result<ChatMessage, ClientError> {
            self.inner.decline_rent(match_id).await
        }
    }

    #[tokio::test]
    async fn failed_send_removes_the_echo_and_preserves_the_text() {
        let (store, match_id, tenant, _) = matched_pair().await;
        let api = Arc::new(FlakyApi::new(LocalApi::new(store, tenant)));
        api.fail_sends.store(true, Ordering::SeqCst);
        let session = ChatSession::new(api, match_id, tenant);

        let err = session.send("important message").await.unwrap_err();
        match err {
            ClientError::SendFailed { text, .. } => assert_eq!(text, "important message"),
            other => panic!("expected SendFailed, got {other:?}"),
        }
        assert!(session.snapshot().await.is_empty(), "no orphaned echo after a failed send");
    }

    #[tokio::test]
    async fn failed_fetch_keeps_the_previous_snapshot_until_the_next_good_tick() {
        let (store, match_id, tenant, landlord) = matched_pair().await;
        let api = Arc::new(FlakyApi::new(LocalApi::new(store.clone(), tenant)));
        let session = ChatSession::new(Arc::clone(&api) as Arc<dyn ChatApi>, match_id, tenant);

        store.send_message(match_id, landlord, "first", Utc::now()).await.unwrap();
        session.sync_now().await;
        assert_eq!(session.snapshot().await.len(), 1);

        api.fail_fetches.store(true, Ordering::SeqCst);
        store.send_message(match_id, landlord, "second", Utc::now()).await.unwrap();
        session.sync_now().await;
        let view = session.snapshot().await;
        assert_eq!(view.len(), 1, "a failed fetch must not clobber the snapshot");
        assert_eq!(view[0].message.text, "first");

        api.fail_fetches.store(false, Ordering::SeqCst);
        session.sync_now().await;
        let view = session.snapshot().await;
        assert_eq!(view.len(), 2);
        assert_eq!(view[1].message.text, "second");
    }

    #[tokio::test]
    async fn snapshot_renders_a_pending_echo_in_thread_order() {
        let (store, match_id, tenant, landlord) = matched_pair().await;
        let session = ChatSession::new(Arc::new(LocalApi::new(store, tenant)), match_id, tenant);

        // An in-flight send next to a newer confirmed message from the
        // other side.
        let t0 = Utc::now();
        {
            let mut state = session.state.lock().await;
            state.pending.push(echo("on its way", t0));
            let mut confirmed = message(landlord, "arrived later", t0 + chrono::Duration::seconds(3));
            confirmed.match_id = match_id;
            state.thread.push(confirmed);
        }

        let view = session.snapshot().await;
        assert_eq!(view[0].message.text, "on its way");
        assert!(!view[0].confirmed);
        assert_eq!(view[1].message.text, "arrived later");
        assert!(view[1].confirmed);
    }

    #[tokio::test]
    async fn stop_is_deterministic_and_restart_is_fresh() {
        let (store, match_id, tenant, _) = matched_pair().await;
        let mut session = ChatSession::new(Arc::new(LocalApi::new(store, tenant)), match_id, tenant);

        session.start();
        assert!(session.is_running());
        session.stop();
        assert!(!session.is_running());
        session.start();
        assert!(session.is_running());
    }
}
