// Terminal draft client entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load client config
// 3. Spawn the connection task
// 4. Run the TUI until the user quits
// 5. Stop the connection task

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use valdraft_core::config;
use valdraft_tui::client::{self, ClientOptions};
use valdraft_tui::ViewState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("Draft client starting up");

    let config = config::load_client_config().context("failed to load client configuration")?;
    info!(server = %config.server_url, user = ?config.user, "Client config loaded");

    let (event_tx, event_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);

    let options = ClientOptions::new(config.server_url.clone(), config.user.clone());
    let client_handle = tokio::spawn(client::run(options, event_tx, cmd_rx));

    let state = ViewState::new(config.server_url, config.user);
    if let Err(e) = valdraft_tui::run(event_rx, cmd_tx, state).await {
        error!("TUI error: {e:#}");
    }

    // The command sender was moved into the UI loop; once it is gone the
    // connection task closes its socket and returns.
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), client_handle).await;

    info!("Draft client shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (the terminal belongs to the UI).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("valdraft.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("valdraft=info,valdraft_tui=info,valdraft_app=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
