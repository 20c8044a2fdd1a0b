// =============================================================================
// Roomlink Backend Constants
// =============================================================================
// This file contains all constants used throughout the backend to enable
// easy tuning and configuration from a single location.

// =============================================================================
// RESPONSE WINDOW
// =============================================================================

/// How long (in seconds) the tenant has to send a first message after a
/// match before it goes stale. Overridable via RESPONSE_WINDOW_SECS.
pub const DEFAULT_RESPONSE_WINDOW_SECS: i64 = 24 * 60 * 60;

// =============================================================================
// CLIENT SYNC
// =============================================================================

/// How often a chat session polls the server for new messages
pub const POLL_INTERVAL_SECS: u64 = 3;

/// How often the display countdown ticks
pub const COUNTDOWN_TICK_SECS: u64 = 1;

/// Clock-skew allowance when matching an optimistic echo against a
/// server-confirmed message (sender + text + approximate send time)
pub const ECHO_MATCH_SKEW_SECS: i64 = 5;

// =============================================================================
// SERVER CONFIGURATION
// =============================================================================

/// Default server port if not specified in environment
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// How often the server sweeps MATCHED rows for lapsed response windows
pub const EXPIRY_SWEEP_INTERVAL_SECS: u64 = 3;

// =============================================================================
// MESSAGE LIMITS
// =============================================================================

/// Maximum character length of a single chat message
pub const MAX_MESSAGE_CHARS: usize = 4000;

// =============================================================================
// HELPER FUNCTIONS FOR VALIDATION
// =============================================================================

/// Validates message text: non-empty after trimming, within the length cap
pub fn is_valid_message_text(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_MESSAGE_CHARS
}
