//! The coordination loop: supervisor tick followed by a status export.

use core::time::Duration;
use std::path::Path;

use tokio::{
    signal,
    time::{MissedTickBehavior, interval, timeout},
};
use tracing::{Instrument as _, info, warn};

use super::{
    state::{AppState, initialize_state},
    supervisor::Supervisor,
    telemetry::TelemetryExporter,
};

/// How long pending detections get to reach the store on shutdown.
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates a future that resolves when a shutdown signal is received.
pub(crate) async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    res = signal::ctrl_c() => drop(res),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler, only Ctrl-C stops the scanner: {e}");
                drop(signal::ctrl_c().await);
            }
        }
    }
    #[cfg(not(unix))]
    {
        drop(signal::ctrl_c().await);
    }
}

/// Ticks the supervisor and exports status every `poll_interval` until `shutdown`
/// resolves, then stops every worker.
pub async fn run_coordination(
    supervisor: &mut Supervisor,
    exporter: &mut TelemetryExporter,
    poll_interval: Duration,
    shutdown: impl Future<Output = ()>,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut last_report = None;
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Received shutdown, stopping workers");
                break;
            }
            _ = ticker.tick() => {
                let report = supervisor.tick().await;
                exporter.export(&report, supervisor).await;
                last_report = Some(report);
            }
        }
    }

    supervisor.shutdown().await;
    if let Some(ref report) = last_report {
        exporter.export(report, supervisor).await;
    }
}

/// Runs the scanner until SIGTERM or Ctrl-C.
///
/// # Errors
///
/// Returns an error if the initial configuration or the message store cannot be loaded.
pub(crate) async fn start(config_path: &Path) -> eyre::Result<()> {
    let AppState {
        mut supervisor,
        mut exporter,
        status_rx: _,
        poll_interval,
        relay_task,
    } = initialize_state(config_path).await?;

    run_coordination(
        &mut supervisor,
        &mut exporter,
        poll_interval,
        shutdown_signal(),
    )
    .in_current_span()
    .await;

    // dropping the supervisor drops the last event sender
    drop(supervisor);
    if timeout(RELAY_DRAIN_TIMEOUT, relay_task).await.is_err() {
        warn!("Message relay did not finish within {RELAY_DRAIN_TIMEOUT:?}");
    }
    info!("Scanner stopped");
    Ok(())
}
