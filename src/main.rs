mod application;
mod config;
mod constants;
mod domain;
mod infrastructure;

use application::session::SessionService;
use clap::Parser;
use config::AppConfig;
use infrastructure::model::OpenAiClient;
use infrastructure::server::{self, state::ServerState};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "mailgate",
    version,
    about = "Voice-session backend bridging OpenAI and a Gmail MCP tool server"
)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8000")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = Arc::new(AppConfig::from_env());
    if let Err(err) = config.validate() {
        warn!(%err, "starting with incomplete configuration; session routes will return errors");
    }
    info!(model = %config.model, tool_server = %config.tool_server.name, "configuration loaded");

    let api_key = config.api_key.clone().unwrap_or_default();
    let reasoner = Arc::new(OpenAiClient::new(api_key, config.model.clone()));
    let sessions = SessionService::new(Arc::clone(&config), reasoner);
    let state = Arc::new(ServerState::new(config, reqwest::Client::new(), sessions));

    server::serve(state, cli.addr).await?;
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
