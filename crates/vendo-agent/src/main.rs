use clap::Parser;
use tracing_subscriber::EnvFilter;

use vendo_agent::agent::UnitAgent;
use vendo_agent::hardware::{LoggingDispenser, StdinCardReader};
use vendo_agent::{AgentConfig, ServerClient};

/// Unit-side agent for the vendo coordinator.
#[derive(Debug, Parser)]
#[command(name = "vendo-agent", version, about)]
struct Args {
    /// Coordinator base URL.
    #[arg(long, env = "VENDO_SERVER_URL", default_value = "http://127.0.0.1:5000")]
    server_url: String,

    /// Name identifying this unit.
    #[arg(long, env = "VENDO_UNIT_NAME")]
    unit_name: String,

    /// Unit credential; established server-side on first heartbeat.
    #[arg(long, env = "VENDO_UNIT_PASSWORD")]
    unit_password: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = AgentConfig::new(args.server_url, args.unit_name, args.unit_password);
    let interval = config.heartbeat_interval;
    let client = ServerClient::new(config)?;

    // Development hardware: tokens on stdin, dispensing as a log line.
    // Real units substitute their reader/actuator implementations here.
    let agent = UnitAgent::new(
        client,
        Box::new(StdinCardReader::new()),
        Box::new(LoggingDispenser),
        interval,
    );

    agent.run().await
}
