//! Status export for the presentation layer.
//!
//! Every coordination tick builds a fresh [`StatusSnapshot`] from the tick's
//! enumeration and the supervisor's live worker state, publishes it on a watch
//! channel and hands it to a [`TelemetrySink`]. The default sink writes the
//! JSON files the dashboard reads.

use alloc::{collections::BTreeMap, sync::Arc};
use std::path::{Path, PathBuf};

use chrono::Utc;
use eyre::WrapErr as _;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::{fs, sync::watch};
use tracing::{debug, error};

use hfscan_common::{ScanCategory, ServiceState, StatusSnapshot};

use super::supervisor::{Supervisor, TickReport};
use crate::config::{OnlineSdr, SelectionPolicy};

pub type StatusTx = watch::Sender<Arc<StatusSnapshot>>;
pub type StatusRx = watch::Receiver<Arc<StatusSnapshot>>;

/// Settings the dashboard needs to render its controls, written to `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardConfig {
    pub scan_services: BTreeMap<ScanCategory, bool>,
    /// `"all"` or a comma-separated id list.
    pub selected_devices: String,
    pub messages_per_page: u32,
    pub online_sdrs: BTreeMap<String, OnlineSdr>,
    pub detected_sdr_devices: Vec<String>,
}

/// Where exported state goes.
pub trait TelemetrySink: Send + Sync {
    fn publish_status(&self, status: &StatusSnapshot) -> BoxFuture<'_, eyre::Result<()>>;

    fn publish_dashboard_config(
        &self,
        config: &DashboardConfig,
    ) -> BoxFuture<'_, eyre::Result<()>>;
}

/// Writes `status.json` and `config.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    status_file: PathBuf,
    config_json_file: PathBuf,
}

impl JsonFileSink {
    #[must_use]
    pub const fn new(status_file: PathBuf, config_json_file: PathBuf) -> Self {
        Self {
            status_file,
            config_json_file,
        }
    }
}

impl TelemetrySink for JsonFileSink {
    fn publish_status(&self, status: &StatusSnapshot) -> BoxFuture<'_, eyre::Result<()>> {
        let body = serde_json::to_vec_pretty(status);
        Box::pin(async move {
            write_json_atomic(&self.status_file, body.wrap_err("Failed to serialize status")?)
                .await
        })
    }

    fn publish_dashboard_config(
        &self,
        config: &DashboardConfig,
    ) -> BoxFuture<'_, eyre::Result<()>> {
        let body = serde_json::to_vec_pretty(config);
        Box::pin(async move {
            write_json_atomic(
                &self.config_json_file,
                body.wrap_err("Failed to serialize dashboard config")?,
            )
            .await
        })
    }
}

/// Replaces `path` with `body` without readers ever seeing a partial file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot be written.
pub(crate) async fn write_json_atomic(path: &Path, body: Vec<u8>) -> eyre::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .wrap_err(format!("Failed to create directory: {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)
        .await
        .wrap_err(format!("Failed to write: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .wrap_err(format!("Failed to replace: {}", path.display()))?;
    Ok(())
}

/// Builds and publishes the status snapshot.
pub struct TelemetryExporter {
    sink: Arc<dyn TelemetrySink>,
    status_tx: StatusTx,
    messages_per_page: u32,
    online_sdrs: BTreeMap<String, OnlineSdr>,
    last_dashboard_config: Option<DashboardConfig>,
}

impl TelemetryExporter {
    #[must_use]
    pub fn new(
        sink: Arc<dyn TelemetrySink>,
        status_tx: StatusTx,
        messages_per_page: u32,
        online_sdrs: BTreeMap<String, OnlineSdr>,
    ) -> Self {
        Self {
            sink,
            status_tx,
            messages_per_page,
            online_sdrs,
            last_dashboard_config: None,
        }
    }

    /// Status before the first tick: nothing detected, every service stopped.
    #[must_use]
    pub fn initial_status() -> StatusSnapshot {
        StatusSnapshot {
            per_category_service_state: ScanCategory::ALL
                .iter()
                .map(|&category| (category, ServiceState::Stopped))
                .collect(),
            per_device_state: BTreeMap::new(),
            detected_devices: Vec::new(),
            selected_devices: Vec::new(),
            hardware_fault: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
        }
    }

    /// Builds a snapshot from `report` and the supervisor's current worker liveness.
    #[must_use]
    pub fn snapshot(report: &TickReport, supervisor: &Supervisor) -> StatusSnapshot {
        StatusSnapshot {
            per_category_service_state: ScanCategory::ALL
                .iter()
                .map(|&category| {
                    (
                        category,
                        ServiceState::from_enabled(report.snapshot.is_enabled(category)),
                    )
                })
                .collect(),
            per_device_state: supervisor.device_states(),
            detected_devices: report.detected.clone(),
            selected_devices: report.selected.clone(),
            hardware_fault: report.enumeration_fault.as_ref().map(ToString::to_string),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
        }
    }

    fn dashboard_config(&self, report: &TickReport) -> DashboardConfig {
        DashboardConfig {
            scan_services: ScanCategory::ALL
                .iter()
                .map(|&category| (category, report.snapshot.is_enabled(category)))
                .collect(),
            selected_devices: match report.snapshot.selection_policy {
                SelectionPolicy::All => "all".to_string(),
                SelectionPolicy::Explicit(ref ids) => {
                    ids.iter().cloned().collect::<Vec<_>>().join(",")
                }
            },
            messages_per_page: self.messages_per_page,
            online_sdrs: self.online_sdrs.clone(),
            detected_sdr_devices: report.detected.clone(),
        }
    }

    /// Produces and publishes the status for this tick.
    ///
    /// Sink failures are logged; the snapshot is returned either way.
    pub async fn export(
        &mut self,
        report: &TickReport,
        supervisor: &Supervisor,
    ) -> Arc<StatusSnapshot> {
        let status = Arc::new(Self::snapshot(report, supervisor));
        if let Err(e) = self.sink.publish_status(&status).await {
            error!("Failed to publish status: {e:#}");
        }

        let dashboard = self.dashboard_config(report);
        if self.last_dashboard_config.as_ref() != Some(&dashboard) {
            match self.sink.publish_dashboard_config(&dashboard).await {
                Ok(()) => self.last_dashboard_config = Some(dashboard),
                Err(e) => error!("Failed to publish dashboard config: {e:#}"),
            }
        }

        self.status_tx.send_replace(Arc::clone(&status));
        debug!(active = status.active_devices(), "Status exported");
        status
    }
}
