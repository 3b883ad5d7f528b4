//! Immutable configuration snapshots and the provider that re-reads them.
//!
//! The provider is polled: every call re-reads the settings source. A source that
//! cannot be read or parsed never fails the caller; the previous valid snapshot is
//! returned and a warning is logged.

use alloc::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use tracing::{info, warn};

use hfscan_common::ScanCategory;

use super::{
    Gain, ScannerConfig, SdrConfig, SdrOverrides, SelectionPolicy, SettingsSource, loader,
};
use crate::hardware::DeviceDescriptor;

/// One frequency of the active rotation, with the category it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationEntry {
    pub category: ScanCategory,
    pub frequency_hz: u32,
}

/// Radio parameters: defaults plus per-device partial overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceParams {
    pub sample_rate: f64,
    pub center_freq_hz: f64,
    pub gain: Gain,
    pub ppm_correction: i32,
    pub overrides: BTreeMap<String, SdrOverrides>,
}

impl From<&SdrConfig> for DeviceParams {
    fn from(sdr: &SdrConfig) -> Self {
        Self {
            sample_rate: sdr.sample_rate,
            center_freq_hz: sdr.center_freq_hz,
            gain: sdr.gain,
            ppm_correction: sdr.ppm_correction,
            overrides: sdr.devices.clone(),
        }
    }
}

impl DeviceParams {
    /// Descriptor for `id`, with its overrides applied over the defaults.
    #[must_use]
    pub fn descriptor_for(&self, id: &str) -> DeviceDescriptor {
        let overrides = self.overrides.get(id).copied().unwrap_or_default();
        DeviceDescriptor {
            id: id.to_string(),
            sample_rate: overrides.sample_rate.unwrap_or(self.sample_rate),
            center_freq_hz: overrides.center_freq_hz.unwrap_or(self.center_freq_hz),
            gain: overrides.gain.unwrap_or(self.gain),
            ppm_correction: overrides.ppm_correction.unwrap_or(self.ppm_correction),
        }
    }
}

/// Point-in-time view of the hot part of the settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub enabled_categories: BTreeSet<ScanCategory>,
    pub selection_policy: SelectionPolicy,
    /// Whether the selection was missing or empty and fell back to all devices.
    pub selection_defaulted: bool,
    pub device_params: DeviceParams,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::from(&ScannerConfig::default())
    }
}

impl From<&ScannerConfig> for ConfigSnapshot {
    fn from(config: &ScannerConfig) -> Self {
        let (selection_policy, selection_defaulted) = config.sdr_selection.policy();
        Self {
            enabled_categories: config.scan_services.enabled(),
            selection_policy,
            selection_defaulted,
            device_params: DeviceParams::from(&config.sdr),
        }
    }
}

impl ConfigSnapshot {
    #[must_use]
    pub fn is_enabled(&self, category: ScanCategory) -> bool {
        self.enabled_categories.contains(&category)
    }

    /// Frequencies of every enabled category, concatenated in category declaration order.
    #[must_use]
    pub fn active_rotation(&self) -> Vec<RotationEntry> {
        ScanCategory::ALL
            .iter()
            .copied()
            .filter(|&category| self.is_enabled(category))
            .flat_map(|category| {
                category
                    .frequencies()
                    .iter()
                    .map(move |&frequency_hz| RotationEntry {
                        category,
                        frequency_hz,
                    })
            })
            .collect()
    }
}

/// Re-reads the settings source on every call and hands out immutable snapshots.
///
/// Each consumer owns its provider, so no consumer ever waits on another's read.
pub struct SnapshotProvider {
    source: Arc<dyn SettingsSource>,
    last_good: Arc<ConfigSnapshot>,
    /// Settings the process was started with, for detecting restart-only changes.
    baseline: Option<Arc<ScannerConfig>>,
    restart_warning_issued: bool,
    last_fault: Option<String>,
}

impl SnapshotProvider {
    /// Creates a provider whose fallback is the snapshot of `startup`.
    #[must_use]
    pub fn new(source: Arc<dyn SettingsSource>, startup: Arc<ScannerConfig>) -> Self {
        Self {
            source,
            last_good: Arc::new(ConfigSnapshot::from(startup.as_ref())),
            baseline: Some(startup),
            restart_warning_issued: false,
            last_fault: None,
        }
    }

    /// An independent provider for another consumer, starting from this one's last snapshot.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            last_good: Arc::clone(&self.last_good),
            baseline: None,
            restart_warning_issued: false,
            last_fault: None,
        }
    }

    /// Re-reads the source and returns the current snapshot.
    ///
    /// On a read or parse failure the previous valid snapshot is returned.
    pub fn current_snapshot(&mut self) -> Arc<ConfigSnapshot> {
        match self.source.read().and_then(|text| loader::parse(&text)) {
            Ok(config) => {
                self.last_fault = None;
                self.check_restart_only_changes(&config);
                let snapshot = ConfigSnapshot::from(&config);
                if snapshot != *self.last_good {
                    if snapshot.selection_defaulted {
                        warn!(
                            "No devices selected in [sdr_selection] or 'selected_devices' is empty. Defaulting to all detected devices."
                        );
                    }
                    info!(
                        enabled = ?snapshot.enabled_categories,
                        selection = ?snapshot.selection_policy,
                        "Applied settings change"
                    );
                    self.last_good = Arc::new(snapshot);
                }
            }
            Err(e) => {
                let message = format!("{:#}", eyre::Report::new(e));
                if self.last_fault.as_deref() != Some(message.as_str()) {
                    warn!(
                        source = %self.source.location(),
                        "Keeping previous settings, reload failed: {message}"
                    );
                }
                self.last_fault = Some(message);
            }
        }
        Arc::clone(&self.last_good)
    }

    /// The error of the most recent poll, if it failed.
    #[must_use]
    pub fn last_fault(&self) -> Option<&str> {
        self.last_fault.as_deref()
    }

    fn check_restart_only_changes(&mut self, config: &ScannerConfig) {
        let Some(ref baseline) = self.baseline else {
            return;
        };
        if baseline.differs_outside_hot_sections(config) {
            if !self.restart_warning_issued {
                warn!(
                    "Detected change outside of [scan_services], [sdr_selection] and [sdr] during runtime. Such changes only take effect after a restart."
                );
                self.restart_warning_issued = true;
            }
        } else {
            self.restart_warning_issued = false;
        }
    }
}
