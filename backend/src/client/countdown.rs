use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::constants::COUNTDOWN_TICK_SECS;
use crate::models::{MatchInfo, MatchStatus};

use super::api::ChatApi;
use super::session::SessionState;

/// Display-only countdown derived from the authoritative match info. The
/// server decides expiry; this only tells the screen what to render.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseWindow {
    pub active: bool,
    pub seconds_left: i64,
}

impl ResponseWindow {
    pub fn from_info(info: &MatchInfo) -> Self {
        let active =
            info.status == MatchStatus::Matched && !info.tenant_messaged && info.time_left_seconds > 0;
        Self {
            active,
            seconds_left: if active { info.time_left_seconds } else { 0 },
        }
    }
}

/// Ticks the displayed countdown once per second. Hitting zero locally is
/// never trusted: the tick stops and one authoritative re-fetch decides
/// what the screen shows next. Resyncs from poll ticks overwrite the local
/// count in between, so display and authority never diverge by more than
/// one poll interval.
pub(crate) async fn run_countdown(api: Arc<dyn ChatApi>, match_id: Uuid, state: Arc<Mutex<SessionState>>) {
    let mut interval = tokio::time::interval(Duration::from_secs(COUNTDOWN_TICK_SECS));
    loop {
        interval.tick().await;

        let hit_zero = {
            let mut state = state.lock().await;
            if !state.window.active {
                continue;
            }
            state.window.seconds_left = (state.window.seconds_left - 1).max(0);
            if state.window.seconds_left == 0 {
                state.window.active = false;
                true
            } else {
                false
            }
        };

        if hit_zero {
            match api.match_info(match_id).await {
                Ok(info) => {
                    let mut state = state.lock().await;
                    state.window = ResponseWindow::from_info(&info);
                    state.info = Some(info);
                    if !state.window.active {
                        // Authoritative zero: nothing left to count.
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(%match_id, error = %err, "countdown re-fetch failed, leaving window inactive");
                    return;
                }
            }
        }
    }
}
