//! Mailroom Poller - pull-path reconciliation job.
//!
//! One invocation fetches the provider's most recent "stored" events and
//! creates any messages the webhook path has not stored yet. Intended to run
//! on an external schedule (cron or similar); each run is independent and
//! idempotent, so overlap with the webhook path is safe.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailroom::poll::{run_poll, EventsClient};
use mailroom::{Config, PostgresStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("poller_starting");

    // Load configuration
    let config = Config::from_env();
    if config.mailgun_api_key.is_empty() || config.mailgun_domain.is_empty() {
        anyhow::bail!("MAILGUN_API_KEY and MAILGUN_DOMAIN must be set");
    }
    info!(
        domain = %config.mailgun_domain,
        api_base = %config.mailgun_api_base,
        limit = config.poll_limit,
        "config_loaded"
    );

    // Connect to the message store
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let store = PostgresStore::new(pool);
    store.init().await.context("Failed to initialize schema")?;

    // Fetch and reconcile one batch of stored events
    let client = EventsClient::new(reqwest::Client::new(), &config);
    let report = run_poll(&client, &store, config.poll_limit).await;

    info!(
        fetched = report.fetched,
        new = report.new,
        skipped = report.skipped,
        "poller_done"
    );

    Ok(())
}
