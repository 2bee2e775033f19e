//! bullscope binary.

use std::io;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use bullscope_queue::{ConnectionConfig, RedisQueueStore};
use bullscope_tui::logging::init_logging;
use bullscope_tui::runtime::run;
use bullscope_tui::setup::prompt_connection;
use bullscope_tui::terminal::TerminalGuard;
use bullscope_tui::{App, AppConfig, Cli, Engine, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging()?;

    let mut connection = cli.apply(ConnectionConfig::from_env());
    if !cli.has_host() {
        let stdin = io::stdin();
        connection = prompt_connection(stdin.lock(), io::stdout(), connection)?;
    }
    let config = AppConfig {
        connection,
        engine: EngineConfig::from_env(),
    };
    info!(
        target_addr = %config.connection.target(),
        prefix = %config.connection.prefix,
        "Starting bullscope"
    );

    let store = Arc::new(RedisQueueStore::new(config.connection.clone())?);
    let (engine, mut messages) = Engine::new(Arc::clone(&store), config.engine.clone());
    let mut app = App::new(engine);

    let result = {
        let mut guard = TerminalGuard::enter()?;
        run(&mut app, &mut messages, &mut guard).await
    };

    app.engine.shutdown().await;
    if let Err(e) = &result {
        error!("Dashboard stopped: {}", e);
    }
    result?;
    Ok(())
}
