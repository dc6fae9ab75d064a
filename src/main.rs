use bay_flow::control::{ControlLoop, MonotonicClock, spawn_control_thread};
use bay_flow::sim::SimulatedLot;
use bay_flow::state::AppState;
use bay_flow::{api, command, config};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::filter::LevelFilter;

fn init_tracing(level: &str) {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let config = config::load_from_path(&config_path)?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = %config_path,
        app = %config.app.name,
        bays = config.bay_angles().len(),
        "bay-flow starting"
    );

    let state = Arc::new(RwLock::new(AppState::new()));
    let snapshots = match state.read() {
        Ok(guard) => guard.subscribe_snapshot(),
        Err(_) => return Err("state lock poisoned at startup".into()),
    };
    tokio::spawn(log_availability(snapshots));

    let clock = MonotonicClock::new();
    let lot = SimulatedLot::new(
        config.bay_angles(),
        config.arrival_interval(),
        config.dwell_time(),
        clock,
    );
    tracing::info!(
        arrival_secs = config.arrival_interval().as_secs(),
        dwell_secs = config.dwell_time().as_secs(),
        "Using simulated installation"
    );

    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let control = ControlLoop::from_config(&config, lot.peripherals())?
        .with_inbox(requests_rx)
        .with_state(Arc::clone(&state));

    let stop_flag = Arc::new(AtomicBool::new(false));
    let control_handle = spawn_control_thread(
        control,
        clock,
        config.poll_interval(),
        Arc::clone(&stop_flag),
    );

    let command_addr = config.command_addr()?;
    let command_listener = tokio::net::TcpListener::bind(command_addr).await?;
    tracing::info!(addr = %command_addr, "Command listener ready");
    tokio::spawn(command::listener::serve(command_listener, requests_tx));

    let app = api::router(Arc::clone(&state));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port()));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    stop_flag.store(true, Ordering::Relaxed);
    if control_handle.join().is_err() {
        tracing::error!("Control thread panicked");
    }
    tracing::info!(parked = lot.parked_count(), "bay-flow stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Log whenever the number of free bays changes.
async fn log_availability(mut snapshots: watch::Receiver<Option<bay_flow::state::LotSnapshot>>) {
    let mut last_free = None;
    while snapshots.changed().await.is_ok() {
        let free = snapshots.borrow_and_update().as_ref().map(|s| s.free_count());
        if free != last_free {
            if let Some(free) = free {
                tracing::info!(free, "Lot availability changed");
            }
            last_free = free;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::config;

    #[test]
    fn default_config_is_valid_toml() -> Result<(), Box<dyn std::error::Error>> {
        let _config = config::load_default()?;
        Ok(())
    }
}
