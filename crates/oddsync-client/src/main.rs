// oddsync entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, so stdout stays free for `status` output)
// 2. Load config (seeding config/ from defaults/ on first run)
// 3. Build the SSE transport and the REST backend
// 4. Spawn the sync engine
// 5. Read commands from stdin until `quit` or EOF
// 6. Stop the engine and wait for it to wind down

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use oddsync::api::HttpBackend;
use oddsync::engine::{EngineSettings, SyncCommand, SyncEngine};
use oddsync::reconcile::TracingSink;
use oddsync::store::{DomainStore, Stores};
use oddsync::transport::SseTransport;
use oddsync_core::config;
use oddsync_core::model::{bets_for_prediction, newest_first, User};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("oddsync starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        base_url = %config.server.base_url,
        authenticated = config.credentials.session_token.is_some(),
        "Config loaded"
    );

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport = Arc::new(SseTransport::new(http.clone(), config.server.events_url()));
    let backend = Arc::new(HttpBackend::new(
        http,
        &config.server.base_url,
        config.credentials.session_token.clone(),
    ));

    let engine = SyncEngine::new(
        transport,
        backend,
        Arc::new(TracingSink),
        EngineSettings::from_config(&config),
    );
    let stores = engine.stores();
    let connected = engine.connected();

    let (visibility_tx, visibility_rx) = mpsc::channel(16);
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let engine_handle = tokio::spawn(engine.run(visibility_rx, cmd_rx));

    let watchers = [
        tokio::spawn(watch_status(connected, stores.session.subscribe())),
        watch_errors(&stores.predictions),
        watch_errors(&stores.bets),
        watch_errors(&stores.leaderboard),
        watch_errors(&stores.session),
    ];

    info!("Ready. Commands: show, hide, refresh, status, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let delivered = match line.trim() {
            "" => true,
            "show" => visibility_tx.send(true).await.is_ok(),
            "hide" => visibility_tx.send(false).await.is_ok(),
            "refresh" => cmd_tx.send(SyncCommand::RefreshAll).await.is_ok(),
            "status" => {
                print_status(&stores);
                true
            }
            "quit" | "exit" => break,
            other => {
                warn!(command = other, "Unknown command");
                true
            }
        };
        if !delivered {
            warn!("Sync engine is no longer running");
            break;
        }
    }

    let _ = cmd_tx.send(SyncCommand::Stop).await;
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, engine_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("Sync engine error: {:#}", e),
        Ok(Err(e)) => error!("Sync engine task failed: {}", e),
        Err(_) => warn!("Sync engine did not stop within {:?}", SHUTDOWN_TIMEOUT),
    }
    for watcher in &watchers {
        watcher.abort();
    }

    info!("oddsync shut down cleanly");
    Ok(())
}

/// Log connection flips and session balance changes until the engine's
/// connection manager goes away.
async fn watch_status(
    mut connected: watch::Receiver<bool>,
    mut session: watch::Receiver<Option<User>>,
) {
    loop {
        tokio::select! {
            changed = connected.changed() => {
                if changed.is_err() {
                    break;
                }
                let up = *connected.borrow_and_update();
                info!(connected = up, "Push connection status changed");
            }
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(user) = session.borrow_and_update().as_ref() {
                    info!(user = %user.name, tokens = user.tokens, "Session updated");
                }
            }
        }
    }
}

/// Surface a domain's refresh failures as they happen instead of waiting for
/// `status`. The slot is cleared at the start of every refresh.
fn watch_errors<T>(store: &DomainStore<T>) -> JoinHandle<()>
where
    T: Clone,
{
    let domain = store.domain();
    let mut errors = store.errors();
    tokio::spawn(async move {
        while errors.changed().await.is_ok() {
            match errors.borrow_and_update().as_deref() {
                Some(message) => warn!(%domain, error = message, "Domain is stale"),
                None => debug!(%domain, "Error slot cleared"),
            }
        }
    })
}

fn print_status(stores: &Stores) {
    match stores.session.snapshot() {
        Some(user) => println!("session: {} ({} tokens)", user.name, user.tokens),
        None => println!("session: anonymous"),
    }

    let all_bets = stores.bets.snapshot();
    let predictions = stores.predictions.snapshot();
    println!("predictions: {}", predictions.len());
    for entry in &predictions {
        let prediction = &entry.prediction;
        let mine = bets_for_prediction(&all_bets, &prediction.id).len();
        println!(
            "  {} [{:?}] {} tokens placed, {} of my bets",
            prediction.name, prediction.status, entry.odds.total_tokens_placed, mine
        );
        for choice in &prediction.choices {
            let odds = entry
                .odds
                .choices
                .iter()
                .find(|o| o.prediction_choice_id == choice.id)
                .and_then(|o| o.multiplier());
            match odds {
                Some(x) => println!("    {} x{:.2}", choice.name, x),
                None => println!("    {} (no bets yet)", choice.name),
            }
        }
    }

    let bets = newest_first(&all_bets);
    println!("bets: {}", bets.len());
    for bet in bets.iter().take(5) {
        println!(
            "  {} {:?} amount={} won={}",
            bet.id,
            bet.status,
            bet.amount,
            bet.won_amount.unwrap_or(0)
        );
    }

    let leaderboard = stores.leaderboard.snapshot();
    println!("leaderboard: {} rows", leaderboard.len());
    for row in leaderboard.iter().take(3) {
        println!("  #{} {} {}", row.rank, row.name, row.tokens);
    }

    for (domain, message) in stores.errors() {
        println!("error [{domain}]: {message}");
    }
}

/// Initialize tracing to stderr.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("oddsync=info,oddsync_core=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
