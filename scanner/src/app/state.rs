use alloc::sync::Arc;
use core::time::Duration;
use std::path::Path;

use tokio::sync::{mpsc, watch};
use tracing::{Instrument as _, error, info, warn};

use super::{
    relay::MessageRelay,
    supervisor::Supervisor,
    telemetry::{JsonFileSink, StatusRx, TelemetryExporter},
    worker::{WorkerContext, WorkerTiming},
};
use crate::{
    config::{FileSource, ScannerConfig, SnapshotProvider, load, resolve_config_relative_paths},
    detect::SimulatedDetector,
    hardware::{RadioDriver, SimulatedDriver},
    recordings::RecordingWriter,
    registry::DeviceRegistry,
    store::open_store,
};

/// Everything the coordination loop runs with.
pub struct AppState {
    pub supervisor: Supervisor,
    pub exporter: TelemetryExporter,
    /// Latest exported status, for a presentation layer embedding the scanner in-process.
    pub status_rx: StatusRx,
    pub poll_interval: Duration,
    /// Finishes once every worker (and so every event sender) is gone.
    pub relay_task: tokio::task::JoinHandle<()>,
}

/// Builds the radio driver from the settings.
///
/// Only the built-in simulator ships; without `[simulator] devices` nothing is detected.
#[must_use]
pub fn build_driver(config: &ScannerConfig) -> Arc<dyn RadioDriver> {
    if config.simulator.devices.is_empty() {
        warn!("No devices listed under [simulator]; no receivers will be detected");
    }
    Arc::new(SimulatedDriver::from_config(&config.simulator))
}

/// Loads the config, opens the store and wires up supervisor, exporter and relay.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded or the message store cannot be opened.
#[tracing::instrument(skip_all)]
pub async fn initialize_state(config_path: &Path) -> eyre::Result<AppState> {
    let config = Arc::new(load(config_path).await?);
    let paths = &config.app_paths;

    let store = open_store(config.db.as_ref(), config_path).await?;
    let relay = MessageRelay::new(
        store,
        Some(resolve_config_relative_paths(config_path, &paths.messages_file)),
        config.app.messages_per_page,
    );
    if let Err(e) = relay.refresh_export().await {
        error!("Failed to write initial messages export: {e:#}");
    }
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let relay_task = tokio::spawn(relay.run(events_rx).in_current_span());

    let driver = build_driver(&config);
    let context = WorkerContext {
        driver: Arc::clone(&driver),
        detector: Arc::new(SimulatedDetector),
        recordings: Some(RecordingWriter::new(resolve_config_relative_paths(
            config_path,
            &paths.recordings_dir,
        ))),
        events: events_tx,
        timing: WorkerTiming::from(&config.worker),
    };
    let snapshots = SnapshotProvider::new(
        Arc::new(FileSource::new(config_path)),
        Arc::clone(&config),
    );
    let supervisor = Supervisor::new(
        DeviceRegistry::new(driver),
        snapshots,
        context,
        Duration::from_millis(config.worker.join_timeout_ms),
    );

    let (status_tx, status_rx) = watch::channel(Arc::new(TelemetryExporter::initial_status()));
    let exporter = TelemetryExporter::new(
        Arc::new(JsonFileSink::new(
            resolve_config_relative_paths(config_path, &paths.status_file),
            resolve_config_relative_paths(config_path, &paths.config_json_file),
        )),
        status_tx,
        config.app.messages_per_page,
        config.online_sdrs.clone(),
    );

    info!(
        "Coordination every {:?}, worker join timeout {} ms",
        config.app.poll_interval(),
        config.worker.join_timeout_ms
    );

    Ok(AppState {
        supervisor,
        exporter,
        status_rx,
        poll_interval: config.app.poll_interval(),
        relay_task,
    })
}
