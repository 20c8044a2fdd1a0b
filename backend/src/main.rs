use axum::{
    routing::{get, post, put},
    Router,
};
use roomlink::{constants::EXPIRY_SWEEP_INTERVAL_SECS, handlers, utils, Config, CoreStore};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use axum::http::{HeaderValue, Method};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let config = Config::from_env()?;
    let store = CoreStore::new(config.response_window_secs);

    // Authoritative expiry does not wait for a client to poll.
    spawn_expiry_sweep(store.clone());

    let port = config.port;
    let app = create_router(store, config);

    let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Server running on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(store: CoreStore, config: Config) -> Router {
    let cors_layer = create_cors_layer(&config);
    let app_state = (store, config);

    Router::new()
        .route("/health", get(health_check))
        // Registries
        .route("/api/users", post(handlers::swipes::register_user))
        .route("/api/properties", post(handlers::swipes::register_property))
        // Swipe deck
        .route("/api/swipes", post(handlers::swipes::record_swipe))
        // Conversations and threads
        .route("/api/chats/tenant", get(handlers::chat::tenant_conversations))
        .route("/api/chats/landlord", get(handlers::chat::landlord_conversations))
        .route("/api/chats/{match_id}/info", get(handlers::chat::match_info))
        .route(
            "/api/chats/{match_id}/messages",
            get(handlers::chat::list_messages).post(handlers::chat::send_message),
        )
        .route("/api/chats/{match_id}/read", put(handlers::chat::mark_read))
        // Rental workflow
        .route("/api/chats/{match_id}/viewing/propose", post(handlers::workflow::propose_viewing))
        .route("/api/chats/{match_id}/viewing/accept", post(handlers::workflow::accept_viewing))
        .route("/api/chats/{match_id}/viewing/decline", post(handlers::workflow::decline_viewing))
        .route("/api/chats/{match_id}/rent/propose", post(handlers::workflow::send_rent_proposal))
        .route("/api/chats/{match_id}/rent/pay", post(handlers::workflow::pay_rent))
        .route("/api/chats/{match_id}/rent/decline", post(handlers::workflow::decline_rent))
        .layer(cors_layer)
        .with_state(app_state)
}

fn create_cors_layer(_config: &Config) -> CorsLayer {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    // Check if ALLOWED_ORIGINS environment variable is set for multiple domains
    if let Ok(cors_origins) = std::env::var("ALLOWED_ORIGINS") {
        let origins: Vec<HeaderValue> = cors_origins
            .split(',')
            .filter_map(|origin| {
                let trimmed = origin.trim();
                if !trimmed.is_empty() {
                    trimmed.parse().ok()
                } else {
                    None
                }
            })
            .collect();

        if !origins.is_empty() {
            cors = cors.allow_origin(origins);
        } else {
            // Fallback to permissive if parsing fails
            cors = cors.allow_origin(Any);
        }
    } else {
        // Default to permissive for development
        cors = cors.allow_origin(Any);
    }

    cors
}

fn spawn_expiry_sweep(store: CoreStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(EXPIRY_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let expired = store.expire_due_matches(chrono::Utc::now()).await;
            if !expired.is_empty() {
                tracing::info!("⏰ Expired {} match(es) past their response window", expired.len());
            }
        }
    });
}

async fn health_check() -> &'static str {
    "OK"
}
