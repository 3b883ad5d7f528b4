//! Configuration data types for the scanner.
//!
//! This module contains the structures deserialized from the TOML settings file:
//! scan services, device selection, radio parameters, file paths, timing, the
//! built-in simulator and the list of online receivers shown on the dashboard.

use alloc::collections::{BTreeMap, BTreeSet};
use core::time::Duration;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use hfscan_common::ScanCategory;

/// A boolean-like settings value.
///
/// Accepts TOML booleans, integers (`0` is false) and the strings `yes/no`,
/// `true/false`, `on/off` and `1/0` in any case.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "RawFlag")]
pub struct Flag(pub bool);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl TryFrom<RawFlag> for Flag {
    type Error = String;

    fn try_from(raw: RawFlag) -> Result<Self, Self::Error> {
        match raw {
            RawFlag::Bool(b) => Ok(Self(b)),
            RawFlag::Int(i) => Ok(Self(i != 0)),
            RawFlag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" | "on" | "1" => Ok(Self(true)),
                "no" | "false" | "off" | "0" | "" => Ok(Self(false)),
                _ => Err(format!("'{text}' is not a boolean-like value")),
            },
        }
    }
}

/// `[scan_services]`: which categories are scanned.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanServices {
    #[serde(default)]
    pub hfgcs: Flag,
    #[serde(default)]
    pub js8: Flag,
    #[serde(default)]
    pub adsb: Flag,
}

impl ScanServices {
    #[must_use]
    pub const fn is_enabled(&self, category: ScanCategory) -> bool {
        match category {
            ScanCategory::PrimaryVoice => self.hfgcs.0,
            ScanCategory::DigitalText => self.js8.0,
            ScanCategory::Adsb => self.adsb.0,
        }
    }

    /// Enabled categories; iteration order is declaration order.
    #[must_use]
    pub fn enabled(&self) -> BTreeSet<ScanCategory> {
        ScanCategory::ALL
            .iter()
            .copied()
            .filter(|&c| self.is_enabled(c))
            .collect()
    }
}

/// Which detected devices should be scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Every detected device.
    All,
    /// Only the listed ids, and only while they are detected.
    Explicit(BTreeSet<String>),
}

impl SelectionPolicy {
    /// Applies the policy to the detected devices, keeping their order.
    ///
    /// Listed ids that are not detected are dropped.
    #[must_use]
    pub fn resolve(&self, detected: &[String]) -> Vec<String> {
        match *self {
            Self::All => detected.to_vec(),
            Self::Explicit(ref ids) => detected
                .iter()
                .filter(|&id| ids.contains(id))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
enum RawSelection {
    Text(String),
    List(Vec<String>),
}

/// `[sdr_selection]`: device selection policy.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct SdrSelection {
    /// `"all"`, `"S1,S2"` or `["S1", "S2"]`.
    #[serde(default)]
    selected_devices: Option<RawSelection>,
}

impl SdrSelection {
    /// Resolves the configured value to a policy.
    ///
    /// The second value is `true` when nothing usable was configured and the
    /// policy fell back to [`SelectionPolicy::All`].
    #[must_use]
    pub fn policy(&self) -> (SelectionPolicy, bool) {
        let ids: BTreeSet<String> = match self.selected_devices {
            None => BTreeSet::new(),
            Some(RawSelection::Text(ref text)) if text.trim().eq_ignore_ascii_case("all") => {
                return (SelectionPolicy::All, false);
            }
            Some(RawSelection::Text(ref text)) => text
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(RawSelection::List(ref list)) => list
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        };
        if ids.is_empty() {
            (SelectionPolicy::All, true)
        } else {
            (SelectionPolicy::Explicit(ids), false)
        }
    }
}

/// Tuner gain: automatic or a fixed value in dB.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(try_from = "RawGain", into = "RawGain")]
pub enum Gain {
    #[default]
    Auto,
    Db(f64),
}

#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum RawGain {
    Number(f64),
    Text(String),
}

impl TryFrom<RawGain> for Gain {
    type Error = String;

    fn try_from(raw: RawGain) -> Result<Self, Self::Error> {
        match raw {
            RawGain::Number(db) if db.is_finite() => Ok(Self::Db(db)),
            RawGain::Number(db) => Err(format!("gain must be a finite number, got {db}")),
            RawGain::Text(text) if text.trim().eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            RawGain::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|db| db.is_finite())
                .map(Self::Db)
                .ok_or_else(|| format!("gain must be \"auto\" or a number, got '{text}'")),
        }
    }
}

impl From<Gain> for RawGain {
    fn from(gain: Gain) -> Self {
        match gain {
            Gain::Auto => Self::Text("auto".to_string()),
            Gain::Db(db) => Self::Number(db),
        }
    }
}

/// Per-device partial overrides, `[sdr.devices.<id>]`.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq)]
pub struct SdrOverrides {
    pub sample_rate: Option<f64>,
    pub center_freq_hz: Option<f64>,
    pub gain: Option<Gain>,
    pub ppm_correction: Option<i32>,
}

/// `[sdr]`: default radio parameters plus per-device overrides.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SdrConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    #[serde(default = "default_center_freq")]
    pub center_freq_hz: f64,
    #[serde(default)]
    pub gain: Gain,
    #[serde(default)]
    pub ppm_correction: i32,
    #[serde(default)]
    pub devices: BTreeMap<String, SdrOverrides>,
}

impl Default for SdrConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            center_freq_hz: default_center_freq(),
            gain: Gain::Auto,
            ppm_correction: 0,
            devices: BTreeMap::new(),
        }
    }
}

const fn default_sample_rate() -> f64 {
    2_048_000.0
}

const fn default_center_freq() -> f64 {
    8_992_000.0
}

/// `[app]`: coordination cadence and dashboard paging.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_messages_per_page")]
    pub messages_per_page: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            messages_per_page: default_messages_per_page(),
        }
    }
}

impl AppConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

const fn default_poll_interval_ms() -> u64 {
    5000
}

const fn default_messages_per_page() -> u32 {
    50
}

/// `[app_paths]`: files read by the dashboard.
///
/// Relative paths are interpreted relative to the config file.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AppPaths {
    #[serde(default = "default_status_file")]
    pub status_file: String,
    #[serde(default = "default_messages_file")]
    pub messages_file: String,
    #[serde(default = "default_config_json_file")]
    pub config_json_file: String,
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: String,
}

impl Default for AppPaths {
    fn default() -> Self {
        Self {
            status_file: default_status_file(),
            messages_file: default_messages_file(),
            config_json_file: default_config_json_file(),
            recordings_dir: default_recordings_dir(),
        }
    }
}

fn default_status_file() -> String {
    "./hfscan_data/status.json".to_string()
}

fn default_messages_file() -> String {
    "./hfscan_data/messages.json".to_string()
}

fn default_config_json_file() -> String {
    "./hfscan_data/config.json".to_string()
}

fn default_recordings_dir() -> String {
    "./hfscan_data/recordings".to_string()
}

/// Configuration for the optional local `SQLite` message store.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Path to the `SQLite` database file. Relative paths are resolved relative to the config file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// When false, messages are only kept in memory for the lifetime of the process.
    #[serde(default = "do_db_enable")]
    pub enable: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            enable: do_db_enable(),
        }
    }
}

fn default_db_path() -> String {
    "./hfscan.db".to_string()
}

const fn do_db_enable() -> bool {
    true
}

/// `[worker]`: per-device scan loop timing.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct WorkerConfig {
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Length of one capture in seconds of samples.
    #[serde(default = "default_capture_secs")]
    pub capture_secs: f64,
    #[serde(default = "default_empty_capture_pause_ms")]
    pub empty_capture_pause_ms: u64,
    #[serde(default = "default_open_backoff_ms")]
    pub open_backoff_ms: u64,
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval_ms(),
            capture_secs: default_capture_secs(),
            empty_capture_pause_ms: default_empty_capture_pause_ms(),
            open_backoff_ms: default_open_backoff_ms(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

const fn default_scan_interval_ms() -> u64 {
    5000
}

const fn default_capture_secs() -> f64 {
    2.0
}

const fn default_empty_capture_pause_ms() -> u64 {
    1000
}

const fn default_open_backoff_ms() -> u64 {
    1000
}

const fn default_join_timeout_ms() -> u64 {
    10_000
}

/// `[logging]`
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[simulator]`: devices exposed by the built-in simulated driver.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub devices: Vec<String>,
    /// Serials whose open always fails.
    #[serde(default)]
    pub fail_open: Vec<String>,
    /// When set, every Nth capture on a handle faults.
    #[serde(default)]
    pub capture_fault_every: Option<u32>,
}

/// A remote receiver listed on the dashboard, `[online_sdrs.<name>]`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct OnlineSdr {
    pub url: String,
    #[serde(default = "default_online_kind", rename = "type", alias = "kind")]
    pub kind: String,
}

fn default_online_kind() -> String {
    "unknown".to_string()
}

/// Root of the settings file.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct ScannerConfig {
    #[serde(default)]
    pub scan_services: ScanServices,
    #[serde(default)]
    pub sdr_selection: SdrSelection,
    #[serde(default)]
    pub sdr: SdrConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub app_paths: AppPaths,
    /// Optional database configuration. When omitted messages are kept in memory only.
    #[serde(default)]
    pub db: Option<DbConfig>,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub online_sdrs: BTreeMap<String, OnlineSdr>,
}

impl ScannerConfig {
    /// Checks the values serde cannot: radio parameters must be positive and finite,
    /// timings must be non-zero.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending key.
    pub fn validate(&self) -> Result<(), String> {
        positive("sdr.sample_rate", self.sdr.sample_rate)?;
        positive("sdr.center_freq_hz", self.sdr.center_freq_hz)?;
        for (id, overrides) in &self.sdr.devices {
            if let Some(rate) = overrides.sample_rate {
                positive(&format!("sdr.devices.{id}.sample_rate"), rate)?;
            }
            if let Some(freq) = overrides.center_freq_hz {
                positive(&format!("sdr.devices.{id}.center_freq_hz"), freq)?;
            }
        }
        positive("worker.capture_secs", self.worker.capture_secs)?;
        non_zero("app.poll_interval_ms", self.app.poll_interval_ms)?;
        non_zero("worker.scan_interval_ms", self.worker.scan_interval_ms)?;
        non_zero("worker.empty_capture_pause_ms", self.worker.empty_capture_pause_ms)?;
        non_zero("worker.open_backoff_ms", self.worker.open_backoff_ms)?;
        Ok(())
    }

    /// Whether `other` differs from `self` outside the sections that are re-read while running.
    #[must_use]
    pub fn differs_outside_hot_sections(&self, other: &Self) -> bool {
        let effective = Self {
            scan_services: other.scan_services,
            sdr_selection: other.sdr_selection.clone(),
            sdr: other.sdr.clone(),
            ..self.clone()
        };
        effective != *other
    }
}

fn positive(key: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(format!("{key} must be a positive number, got {value}"))
    }
}

fn non_zero(key: &str, value: u64) -> Result<(), String> {
    if value == 0 {
        Err(format!("{key} must be greater than zero"))
    } else {
        Ok(())
    }
}

/// Resolves a path to an absolute one.
///
/// If the path is absolute, returns it as-is. If relative, joins it with the
/// config file's parent directory and normalizes the result to remove redundant
/// components like `./`.
pub fn resolve_config_relative_paths(config_path: &Path, relative_path: &str) -> PathBuf {
    let path = Path::new(relative_path);
    let resolved = if path.is_absolute() || relative_path == ":memory:" {
        path.to_path_buf()
    } else {
        config_path
            .parent()
            .map_or_else(|| path.to_path_buf(), |d| d.join(path))
    };

    // canonicalize() is not an option, the file might not exist yet
    normalize_path(&resolved)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        use Component as C;
        match component {
            C::Normal(c) => {
                result.push(c);
            }
            C::ParentDir => {
                result.pop();
            }
            C::CurDir => {}
            C::RootDir | C::Prefix(_) => {
                result.push(component);
            }
        }
    }
    result
}
