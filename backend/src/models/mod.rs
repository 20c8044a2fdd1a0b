pub mod users;
pub mod swipes;
pub mod matches;
pub mod messages;

pub use users::{Property, Role, User};
pub use swipes::{MatchOutcome, SwipeDecision, SwipeDirection};
pub use matches::{ConversationSummary, Match, MatchInfo, MatchStatus};
pub use messages::{ActionCardPayload, ActionKind, ActionState, ChatMessage, MessageType};
