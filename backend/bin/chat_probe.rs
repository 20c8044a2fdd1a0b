use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::time;
use tracing::info;

use roomlink::client::{api::parse_date_time, ChatApi, ChatSession, HttpApi};
use roomlink::models::{Role, SwipeDirection};
use roomlink::utils::init_logging;

/// Plays a full swipe -> match -> chat -> viewing scenario against a
/// running server, end to end over HTTP. Useful as a smoke check after
/// deployments.
#[derive(Parser, Debug)]
#[command(name = "chat_probe")]
struct Args {
    /// Base URL of the server under test
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    base_url: String,

    /// Viewing slot the landlord proposes (ISO-8601)
    #[arg(long, default_value = "2030-03-15T14:00:00")]
    viewing_at: String,

    /// How long to let the chat sessions poll before checking convergence
    #[arg(long, default_value_t = 7)]
    settle_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    info!("🔗 Probing {} ...", args.base_url);
    let viewing_at = parse_date_time(&args.viewing_at)?;

    // Bootstrap two actors and one listing.
    let bootstrap = HttpApi::new(&args.base_url, uuid::Uuid::nil());
    let tenant = bootstrap.register_user("Probe Tenant", Role::Tenant).await?;
    let landlord = bootstrap.register_user("Probe Landlord", Role::Landlord).await?;

    let tenant_api = HttpApi::new(&args.base_url, tenant.id);
    let landlord_api = HttpApi::new(&args.base_url, landlord.id);
    let property = landlord_api.register_property("Probe Loft").await?;

    // Mutual like.
    let first = tenant_api
        .swipe(Role::Tenant, property.id, None, SwipeDirection::Like)
        .await?;
    anyhow::ensure!(!first.matched, "a lone tenant like must not match");
    let second = landlord_api
        .swipe(Role::Landlord, tenant.id, Some(property.id), SwipeDirection::Like)
        .await?;
    let match_id = second.match_id.context("mutual like must produce a match id")?;
    info!("✅ Matched: {}", match_id);

    // Two live chat screens, one per side.
    let mut tenant_session = ChatSession::new(Arc::new(tenant_api.clone()), match_id, tenant.id);
    let mut landlord_session = ChatSession::new(Arc::new(landlord_api.clone()), match_id, landlord.id);
    tenant_session.start();
    landlord_session.start();

    tenant_session.send("Hi! Is the loft still available?").await?;
    landlord_session.send("It is — want to come see it?").await?;

    // Landlord proposes a viewing, tenant accepts.
    landlord_api.propose_viewing(match_id, viewing_at).await?;
    time::sleep(Duration::from_secs(1)).await;
    let outcome = tenant_api.accept_viewing(match_id).await?;
    info!("📅 {}", outcome.text);

    // Let both pollers converge, then compare what each side renders.
    time::sleep(Duration::from_secs(args.settle_secs)).await;
    let tenant_view = tenant_session.snapshot().await;
    let landlord_view = landlord_session.snapshot().await;
    anyhow::ensure!(
        tenant_view.len() == landlord_view.len(),
        "threads diverged: tenant sees {}, landlord sees {}",
        tenant_view.len(),
        landlord_view.len()
    );
    anyhow::ensure!(
        tenant_view.iter().all(|e| e.confirmed),
        "tenant still holds unreconciled echoes"
    );

    let info = tenant_session
        .match_info()
        .await
        .context("poller never fetched match info")?;
    info!(
        "📊 Probe OK at {} — {} messages, status {:?}, tenant_messaged={}",
        Utc::now(),
        tenant_view.len(),
        info.status,
        info.tenant_messaged
    );

    tenant_session.stop();
    landlord_session.stop();
    Ok(())
}
