mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use roomgrid_core::{logging, Config};

#[derive(Parser, Debug)]
#[command(name = "roomgrid")]
#[command(about = "WebRTC room placement and signaling", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short, global = true)]
    config: Option<String>,

    /// Override the HTTP listen port
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Role {
    /// Assign rooms to healthy signaling servers
    Balancer,
    /// Host rooms and relay peer negotiation over WebSocket
    Signaling,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    // 2. Validate (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!(role = ?cli.role, "roomgrid starting...");
    info!("HTTP address: {}", config.http_address());

    match cli.role {
        Role::Balancer => server::run_balancer(config).await,
        Role::Signaling => server::run_signaling(config).await,
    }
}
