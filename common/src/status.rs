//! Point-in-time status exported for the dashboard.

use alloc::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ScanCategory;

/// Whether scanning for a category is currently enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Running,
    Stopped,
}

impl ServiceState {
    #[must_use]
    pub const fn from_enabled(enabled: bool) -> Self {
        if enabled { Self::Running } else { Self::Stopped }
    }
}

/// Whether a device's worker thread is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Active,
    Inactive,
}

/// Consolidated status, produced fresh on every export cycle.
///
/// Field names follow the JSON keys the dashboard reads from `status.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Enabled / disabled state of every scan category.
    #[serde(rename = "services")]
    pub per_category_service_state: BTreeMap<ScanCategory, ServiceState>,
    /// Liveness of every worker the supervisor currently tracks.
    #[serde(rename = "sdr_devices")]
    pub per_device_state: BTreeMap<String, DeviceState>,
    /// Every device found by the last enumeration.
    #[serde(rename = "detected_sdr_devices")]
    pub detected_devices: Vec<String>,
    /// Devices selected for scanning (selection policy applied to the detected set).
    #[serde(rename = "selected_sdr_devices")]
    pub selected_devices: Vec<String>,
    /// Set when the last enumeration failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_fault: Option<String>,
    #[serde(rename = "app_version")]
    pub version: String,
    #[serde(rename = "last_updated")]
    pub generated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Number of devices reported as [`DeviceState::Active`].
    #[must_use]
    pub fn active_devices(&self) -> usize {
        self.per_device_state
            .values()
            .filter(|&&state| state == DeviceState::Active)
            .count()
    }
}
