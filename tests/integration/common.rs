//! Shared helpers for the integration tests: a scripted radio driver, scripted
//! detectors and a supervisor harness with fast timings.

use std::{
    collections::{BTreeMap, BTreeSet},
    process::Child,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use tokio::sync::mpsc::{self, UnboundedReceiver};

use hfscan_common::ScanCategory;
use hfscan_scanner::{
    app::{Supervisor, WorkerContext, WorkerTiming},
    config::{MemorySource, SettingsSource as _, SnapshotProvider, parse},
    detect::{Detection, DetectionEvent, Detector},
    hardware::{DeviceDescriptor, HardwareError, RadioDriver, RadioHandle, SampleBlock},
    registry::DeviceRegistry,
};

#[derive(Default)]
pub struct Script {
    pub devices: Vec<String>,
    pub enumeration_fault: bool,
    pub fail_open: BTreeSet<String>,
    /// Upcoming captures that fault, per device.
    pub capture_faults: BTreeMap<String, u32>,
    pub empty_captures: bool,
    pub capture_delay: Duration,
    pub opens: BTreeMap<String, u32>,
    pub closes: BTreeMap<String, u32>,
    pub tunes: BTreeMap<String, Vec<u32>>,
    pub in_capture: BTreeSet<String>,
}

/// A driver whose behavior is set by the test and which records every call.
#[derive(Clone, Default)]
pub struct ScriptedDriver(Arc<Mutex<Script>>);

impl ScriptedDriver {
    pub fn with_devices(devices: &[&str]) -> Self {
        let driver = Self::default();
        driver.set_devices(devices);
        driver
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_devices(&self, devices: &[&str]) {
        self.script().devices = devices.iter().map(ToString::to_string).collect();
    }

    pub fn opens(&self, device: &str) -> u32 {
        self.script().opens.get(device).copied().unwrap_or(0)
    }

    pub fn closes(&self, device: &str) -> u32 {
        self.script().closes.get(device).copied().unwrap_or(0)
    }

    pub fn tunes(&self, device: &str) -> Vec<u32> {
        self.script().tunes.get(device).cloned().unwrap_or_default()
    }

    pub fn total_tunes(&self) -> usize {
        self.script().tunes.values().map(Vec::len).sum()
    }

    pub fn in_capture(&self, device: &str) -> bool {
        self.script().in_capture.contains(device)
    }
}

impl RadioDriver for ScriptedDriver {
    fn enumerate(&self) -> Result<Vec<String>, HardwareError> {
        let script = self.script();
        if script.enumeration_fault {
            return Err(HardwareError::Enumeration("scripted failure".to_string()));
        }
        Ok(script.devices.clone())
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn RadioHandle>, HardwareError> {
        let mut script = self.script();
        if script.fail_open.contains(&descriptor.id) {
            return Err(HardwareError::Open {
                device: descriptor.id.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        *script.opens.entry(descriptor.id.clone()).or_default() += 1;
        Ok(Box::new(ScriptedHandle {
            device: descriptor.id.clone(),
            driver: self.clone(),
        }))
    }
}

struct ScriptedHandle {
    device: String,
    driver: ScriptedDriver,
}

impl RadioHandle for ScriptedHandle {
    fn tune(&mut self, frequency_hz: u32) -> Result<(), HardwareError> {
        self.driver
            .script()
            .tunes
            .entry(self.device.clone())
            .or_default()
            .push(frequency_hz);
        Ok(())
    }

    fn capture(&mut self, sample_count: usize) -> Result<SampleBlock, HardwareError> {
        let delay = {
            let mut script = self.driver.script();
            if let Some(remaining) = script.capture_faults.get_mut(&self.device)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(HardwareError::Capture {
                    device: self.device.clone(),
                    reason: "scripted failure".to_string(),
                });
            }
            if script.empty_captures {
                return Ok(SampleBlock::default());
            }
            script.in_capture.insert(self.device.clone());
            script.capture_delay
        };
        thread::sleep(delay);
        self.driver.script().in_capture.remove(&self.device);
        Ok(SampleBlock::from_interleaved(vec![200; sample_count * 2]))
    }

    fn close(self: Box<Self>) {
        *self
            .driver
            .script()
            .closes
            .entry(self.device.clone())
            .or_default() += 1;
    }
}

/// Fires on every block.
pub struct AlwaysDetector;

impl Detector for AlwaysDetector {
    fn detect(
        &self,
        category: ScanCategory,
        frequency_hz: u32,
        _block: &SampleBlock,
    ) -> Option<Detection> {
        Some(Detection {
            decoded_text: format!("{category} hit on {frequency_hz}"),
            callsign: Some("TEST".to_string()),
            notes: None,
        })
    }
}

/// Never fires.
pub struct NeverDetector;

impl Detector for NeverDetector {
    fn detect(&self, _: ScanCategory, _: u32, _: &SampleBlock) -> Option<Detection> {
        None
    }
}

pub fn fast_timing() -> WorkerTiming {
    WorkerTiming {
        scan_interval: Duration::from_millis(10),
        capture_secs: 0.01,
        empty_capture_pause: Duration::from_millis(5),
        open_backoff: Duration::from_millis(10),
    }
}

pub struct Harness {
    pub source: Arc<MemorySource>,
    pub driver: ScriptedDriver,
    pub supervisor: Supervisor,
    pub events: UnboundedReceiver<DetectionEvent>,
}

impl Harness {
    pub fn new(config_toml: &str, driver: ScriptedDriver) -> Self {
        Self::with_options(config_toml, driver, Arc::new(NeverDetector), Duration::from_secs(5))
    }

    pub fn with_options(
        config_toml: &str,
        driver: ScriptedDriver,
        detector: Arc<dyn Detector>,
        join_timeout: Duration,
    ) -> Self {
        let source = Arc::new(MemorySource::new(config_toml));
        let startup = Arc::new(parse(&source.read().unwrap()).unwrap());
        let snapshots = SnapshotProvider::new(source.clone(), startup);
        let (events_tx, events) = mpsc::unbounded_channel();
        let context = WorkerContext {
            driver: Arc::new(driver.clone()),
            detector,
            recordings: None,
            events: events_tx,
            timing: fast_timing(),
        };
        let supervisor = Supervisor::new(
            DeviceRegistry::new(Arc::new(driver.clone())),
            snapshots,
            context,
            join_timeout,
        );
        Self {
            source,
            driver,
            supervisor,
            events,
        }
    }
}

/// Settings with the given scan services table body and a small sample rate.
pub fn settings(services: &str, selection: &str) -> String {
    format!(
        r#"
        [scan_services]
        {services}

        [sdr_selection]
        selected_devices = "{selection}"

        [sdr]
        sample_rate = 1000
        "#
    )
}

/// Guard that kills and waits on a child process when dropped.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        drop(self.0.kill());
        drop(self.0.wait());
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while !condition() {
        if start.elapsed() > timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}
