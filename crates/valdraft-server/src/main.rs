// Draft server entry point.
//
// Startup sequence:
// 1. Initialize tracing (stdout)
// 2. Load config
// 3. Open the pick database
// 4. Load the candidate roster (cache or aggregation)
// 5. Build the ledger and its sync channel
// 6. Spawn the store watcher, the WebSocket server and the server loop
// 7. Wait for Ctrl+C, then shut down

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use valdraft_app::app::{self, AppState};
use valdraft_app::watcher::StoreWatcher;
use valdraft_core::config;
use valdraft_core::db::Database;
use valdraft_core::ledger::PickLedger;
use valdraft_core::sync::SyncChannel;
use valdraft_core::ws_server;
use valdraft_valorant::aggregate::RosterAggregator;
use valdraft_valorant::cache::{self, RosterOrigin};
use valdraft_valorant::stats::HttpStatSource;
use valdraft_valorant::teams::HttpTeamSource;

const DEFAULT_FILTER: &str =
    "valdraft_server=info,valdraft_app=info,valdraft_core=info,valdraft_valorant=info,warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("Draft server starting up");

    // `--refresh` ignores a fresh roster cache and refetches.
    let force_refresh = std::env::args().skip(1).any(|arg| arg == "--refresh");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: draft={}, {} teams, {} stat queries, roster size {}",
        config.draft.name,
        config.draft.teams.len(),
        config.draft.stat_queries.len(),
        config.draft.roster_size
    );

    let db = Database::open_with_timeout(&config.database.path, config.database.busy_timeout())
        .context("failed to open database")?;
    info!(
        "Database opened at {} ({} picks recorded)",
        config.database.path,
        db.pick_count()?
    );

    let http = valdraft_valorant::build_http_client(&config.http)?;
    let aggregator = RosterAggregator::new(
        HttpStatSource::new(http.clone(), config.http.stat_source_url.clone()),
        HttpTeamSource::new(http, config.http.team_source_url.clone()),
    );
    let roster = cache::load_roster(
        &db,
        &aggregator,
        &config.draft,
        &config.overrides,
        std::time::Duration::from_secs(config.cache.roster_ttl_secs),
        force_refresh,
    )
    .await;
    for failure in &roster.failures {
        warn!("roster source failed: {failure}");
    }
    match roster.origin {
        RosterOrigin::Empty => warn!("Starting with an empty candidate list"),
        origin => info!(
            players = roster.players.len(),
            ?origin,
            "Candidate roster loaded"
        ),
    }

    let ledger = Arc::new(PickLedger::new(
        db,
        SyncChannel::new(config.sync.channel_capacity),
    ));

    let watcher = StoreWatcher::new(Arc::clone(&ledger)).context("failed to start store watcher")?;
    let watcher_handle = tokio::spawn(watcher.run(config.sync.poll_interval()));

    let (ws_tx, ws_rx) = mpsc::channel(256);
    let listener = ws_server::bind(&config.websocket.host, config.websocket.port)
        .await
        .with_context(|| {
            format!(
                "failed to bind WebSocket server on {}:{}",
                config.websocket.host, config.websocket.port
            )
        })?;
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(listener, ws_tx).await {
            error!("WebSocket server error: {e}");
        }
    });

    let (store_tx, store_rx) = mpsc::channel(64);
    let state = AppState::new(ledger, roster.players, store_tx);
    let mut app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ws_rx, store_rx, state).await {
            error!("Server loop error: {e}");
        }
    });

    info!("Draft server ready");

    let loop_exited = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to listen for Ctrl+C: {e}");
            }
            info!("Ctrl+C received, shutting down");
            false
        }
        _ = &mut app_handle => {
            warn!("Server loop exited");
            true
        }
    };

    ws_handle.abort();
    watcher_handle.abort();
    if !loop_exited {
        // Open connections still hold transport senders; give the loop a
        // moment, then stop it.
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), &mut app_handle).await;
        app_handle.abort();
    }

    info!("Draft server shut down cleanly");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
