// Waiver desk entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database and build the desk with a channel notifier
// 4. Import rosters into an empty database
// 5. Create mpsc channels
// 6. Spawn WebSocket server task
// 7. Spawn app logic task
// 8. Wait for Ctrl+C, then shut down

use std::path::Path;
use std::sync::Arc;

use waiverwire_app::app;
use waiverwire_app::ws_server;
use waiverwire_core::config;
use waiverwire_core::desk::WaiverDesk;
use waiverwire_core::ids::TeamId;
use waiverwire_core::notifier::ChannelNotifier;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Waiver desk starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league={}, {} teams, season {} from week {}",
        config.league.name, config.league.num_teams, config.league.season, config.league.start_week
    );

    // 3. Open database; outcomes flow to the app loop through a channel
    let (outcome_tx, outcome_rx) = mpsc::channel(256);
    let notifier = Arc::new(ChannelNotifier::new(outcome_tx));
    let desk = WaiverDesk::from_config(&config, notifier).context("failed to open database")?;
    info!("Database opened at {}", config.database_path().display());

    // 4. Seed rosters on first run
    if let Some(rosters) = &config.data_paths.rosters {
        if desk.database().has_rosters()? {
            info!("Rosters already loaded, skipping import of {}", rosters);
        } else {
            let summary = desk
                .import_rosters_from_path(Path::new(rosters), config.league.num_teams)
                .with_context(|| format!("failed to import rosters from {rosters}"))?;
            info!(
                "Imported {} players from {} ({} rostered)",
                summary.players, rosters, summary.rostered
            );
        }
    }

    let period = desk.current_period()?;
    info!("Current scheduling period: {}", period);
    for team in (1..=config.league.num_teams).map(|t| TeamId(t as i64)) {
        info!(
            "Team {} ({}): {} players rostered",
            team,
            config.team_name(team).unwrap_or("unnamed"),
            desk.team_roster(team)?.len()
        );
    }

    // 5. Create mpsc channels
    let (ws_tx, ws_rx) = mpsc::channel(256);
    let (out_tx, out_rx) = mpsc::channel(256);

    let app_state = app::AppState::new(desk, config.resolution.default_actor.clone());

    // 6. Spawn WebSocket server task
    let ws_port = config.ws_port;
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(ws_port, ws_tx, out_rx).await {
            error!("WebSocket server error: {}", e);
        }
    });

    // 7. Spawn app logic task
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ws_rx, outcome_rx, out_tx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    info!("Application ready. WebSocket server listening on 127.0.0.1:{}", ws_port);
    println!("waiverwire: listening on ws://127.0.0.1:{ws_port} (Ctrl+C to quit)");

    // 8. Block until Ctrl+C
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Shutdown requested");

    // Aborting the server drops its event sender, which ends the app loop.
    ws_handle.abort();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    info!("Waiver desk shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/waiverwire.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("waiverwire.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("waiverwire=info,warn")),
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
