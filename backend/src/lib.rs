pub mod models;
pub mod store;
pub mod client;
pub mod handlers;
pub mod error;
pub mod utils;
pub mod constants;

pub use utils::config::Config;
pub use store::CoreStore;
pub use error::{ClientError, CoreError};

// Re-export common types
pub use anyhow::Result;
pub use uuid::Uuid;
pub use chrono::{DateTime, Utc};
