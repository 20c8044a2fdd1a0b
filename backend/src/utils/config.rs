use anyhow::Result;
use std::env;
use crate::constants::{DEFAULT_RESPONSE_WINDOW_SECS, DEFAULT_SERVER_PORT};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Seconds the tenant has to send a first message after a match.
    pub response_window_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
                .parse()
                .unwrap_or(DEFAULT_SERVER_PORT),
            response_window_secs: env::var("RESPONSE_WINDOW_SECS")
                .unwrap_or_else(|_| DEFAULT_RESPONSE_WINDOW_SECS.to_string())
                .parse()
                .unwrap_or(DEFAULT_RESPONSE_WINDOW_SECS),
        })
    }
}
