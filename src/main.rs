use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use parklot::command::{Command, parse_command};
use parklot::config::DEFAULT_DATA_DIR;
use parklot::controller::{self, Controller};
use parklot::engine::{Engine, validate_license_plate};
use parklot::limits::{CANDIDATE_CHANNEL_CAPACITY, DECISION_CHANNEL_CAPACITY};
use parklot::model::{GateEvent, format_timestamp};
use parklot::notify::NotifyHub;
use parklot::source::{LinePlateSource, run_plate_feed};
use parklot::voting::run_voting_window;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("PARKLOT_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    parklot::observability::init(metrics_port);

    let config_path =
        std::env::var("PARKLOT_CONFIG").unwrap_or_else(|_| "config/config.json".into());
    let vote_window_ms: u64 = std::env::var("PARKLOT_VOTE_WINDOW_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(3000);
    let plate_feed = std::env::var("PARKLOT_PLATE_FEED").ok();
    let data_dir =
        std::env::var("PARKLOT_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());

    let engine = Engine::open_path(&config_path, &data_dir)?;

    info!("parklot started");
    info!("  config: {config_path}");
    info!("  ledger: {}", engine.config().records_path().display());
    for model in [
        engine.config().detector_model_path(),
        engine.config().recogniser_model_path(),
    ]
    .into_iter()
    .flatten()
    {
        info!("  model: {}", model.display());
    }
    info!("  vote window: {vote_window_ms}ms");
    info!(
        "  plate feed: {}",
        plate_feed.as_deref().unwrap_or("operator only")
    );
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let hub = Arc::new(NotifyHub::new());
    let (cand_tx, cand_rx) = mpsc::channel(CANDIDATE_CHANNEL_CAPACITY);
    let (dec_tx, dec_rx) = mpsc::channel(DECISION_CHANNEL_CAPACITY);

    tokio::spawn(run_voting_window(
        cand_rx,
        dec_tx,
        Duration::from_millis(vote_window_ms),
    ));

    if let Some(path) = &plate_feed {
        let file = tokio::fs::File::open(path).await?;
        tokio::spawn(run_plate_feed(LinePlateSource::new(file), cand_tx.clone()));
    }

    tokio::spawn(print_events(hub.subscribe()));

    let controller = Controller::new(engine, hub).with_candidate_sender(cand_tx);
    let (handle, controller_task) = controller::spawn(controller, dec_rx);

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", parklot::command::HELP);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("stdin read error: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let cmd = match parse_command(&line) {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        println!("error: {e}");
                        continue;
                    }
                };
                if let Command::Entry { plate: Some(plate) } = &cmd
                    && !validate_license_plate(plate)
                {
                    warn!("plate {plate} does not match the regional format");
                }
                let quit = cmd == Command::Quit;
                match handle.execute(cmd).await {
                    Ok(reply) => println!("{reply}"),
                    Err(e) => println!("error: {e}"),
                }
                if quit {
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    drop(handle);
    let engine = controller_task.await?;
    let status = engine.get_status();
    info!(
        "parklot stopped ({} of {} spaces occupied)",
        status.occupied(),
        status.total_spaces
    );
    Ok(())
}

/// Console observer for gate events.
async fn print_events(mut events: broadcast::Receiver<GateEvent>) {
    loop {
        match events.recv().await {
            Ok(GateEvent::PlateDecided { plate }) => println!("[gate] recognised {plate}"),
            Ok(GateEvent::VehicleEntered { plate, at }) => {
                println!("[gate] {plate} entered at {}", format_timestamp(&at))
            }
            Ok(GateEvent::VehicleExited { plate, at, fee }) => {
                println!("[gate] {plate} left at {}, fee {fee:.2}", format_timestamp(&at))
            }
            Ok(GateEvent::RateUpdated { hourly_rate }) => {
                println!("[gate] hourly rate now {hourly_rate:.2}")
            }
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("event printer lagged by {n}"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
