//! Concord Node binary
//!
//! Commands on stdin, telemetry on stdout, logs on stderr.

use concord_node::NodeConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concord_node=info,concord=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Concord Node");

    let config = NodeConfig::from_env()?;
    concord_node::run(config).await?;

    Ok(())
}
