//! # positron — position ledger service
//!
//! Wires the pub/sub transport client to the position ledger and runs the
//! connection for the process lifetime.

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use positron::client::PubSubClient;
use positron::config::Config;
use positron::ledger::{self, PositionLedger};
use positron::topics::Topic;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("positron=debug".parse()?),
        )
        .init();

    let cfg = Config::from_env()?;
    info!(
        broker = %cfg.broker_url,
        database = %cfg.database_url,
        consumer = %cfg.consumer,
        "starting position ledger"
    );

    let pool = ledger::connect(&cfg.database_url).await?;

    // Non-fatal by design: a failure here is assumed to mean the schema is
    // already current.
    if let Err(e) = ledger::schema::initialize(&pool).await {
        warn!(error = ?e, "schema initialization skipped");
    }

    let client = PubSubClient::new(&cfg, &Topic::COMMANDS);
    let ledger = PositionLedger::new(pool, client.clone());
    ledger.register(client.registry());

    // Blocks for the process lifetime; link loss reconnects with backoff.
    client.run().await;
    Ok(())
}
