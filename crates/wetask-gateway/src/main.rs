//! WeTask gateway entry point.

use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wetask_broker::{AmqpTransport, Transport};
use wetask_core::config::{BrokerConfig, GatewayConfig};
use wetask_gateway::{GatewayServer, Hub};

/// WebSocket gateway bridging broker events to room-scoped clients.
#[derive(Parser)]
#[command(name = "wetask-gateway", version)]
struct Args {
    /// AMQP broker URL (falls back to RABBITMQ_* variables).
    #[arg(long, env = "RABBITMQ_URL")]
    amqp_url: Option<String>,

    /// Port to listen on.
    #[arg(long, env = "GATEWAY_PORT", default_value_t = 8080)]
    port: u16,

    /// Bind to loopback only instead of all interfaces.
    #[arg(long, env = "GATEWAY_LOOPBACK_ONLY", default_value_t = false)]
    loopback_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = wetask_core::env::load_dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wetask=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let broker = match args.amqp_url {
        Some(url) => BrokerConfig { url },
        None => BrokerConfig::from_env(),
    };
    let config = GatewayConfig {
        port: args.port,
        bind_all: !args.loopback_only,
    };

    let transport: Arc<dyn Transport> = Arc::new(AmqpTransport::connect(&broker.url).await?);
    let (hub, handle) = Hub::connect(transport).await?;
    tokio::spawn(hub.run());

    let server = GatewayServer::new(config, handle);
    server.run().await?;
    Ok(())
}
