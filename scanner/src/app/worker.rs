//! Per-device scan worker.
//!
//! A worker runs on its own thread and owns one radio handle. It cycles the
//! active rotation round robin, captures a block per frequency, runs the
//! detection hook and forwards hits to the message relay.
//!
//! ```text
//! Starting -> Opening -> Scanning -> Reopening -> Opening -> ...
//!                |                       (capture or tune fault)
//!                +-- open fault: back off, exit; the supervisor retries next tick
//! any state -> Closing -> Stopped   (stop signal)
//! ```

use alloc::sync::Arc;
use core::{
    sync::atomic::{AtomicU8, Ordering},
    time::Duration,
};
use std::{
    io,
    sync::mpsc::{self, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
};

use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, info_span, warn};

use crate::{
    config::{RotationEntry, SnapshotProvider, WorkerConfig},
    detect::{Detection, DetectionEvent, Detector},
    hardware::{DeviceDescriptor, HandleSlot, HardwareError, RadioDriver, SampleBlock},
    recordings::RecordingWriter,
};

/// Lifecycle phase a worker reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerPhase {
    Starting = 0,
    Opening = 1,
    Scanning = 2,
    Reopening = 3,
    Closing = 4,
    Stopped = 5,
}

impl WorkerPhase {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Opening,
            2 => Self::Scanning,
            3 => Self::Reopening,
            4 => Self::Closing,
            _ => Self::Stopped,
        }
    }
}

/// Phase shared between a worker (writer) and the supervisor (reader).
#[derive(Debug, Clone)]
pub struct PhaseCell(Arc<AtomicU8>);

impl PhaseCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(WorkerPhase::Starting as u8)))
    }

    #[must_use]
    pub fn get(&self) -> WorkerPhase {
        WorkerPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, phase: WorkerPhase) {
        let previous = WorkerPhase::from_u8(self.0.swap(phase as u8, Ordering::AcqRel));
        if previous != phase {
            debug!("Worker phase {previous:?} -> {phase:?}");
        }
    }
}

/// Supervisor side of a worker's stop signal. Dropping it also stops the worker.
#[derive(Debug)]
pub struct StopHandle(Option<mpsc::Sender<()>>);

impl StopHandle {
    /// Signals the worker to stop.
    pub fn cancel(&mut self) {
        self.0.take();
    }
}

/// Worker side of the stop signal: closed once the [`StopHandle`] is cancelled or dropped.
#[derive(Debug)]
pub struct StopSignal(mpsc::Receiver<()>);

impl StopSignal {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        !matches!(self.0.try_recv(), Err(TryRecvError::Empty))
    }

    /// Sleeps for `duration` unless cancelled first. Returns whether the signal fired.
    #[must_use]
    pub fn wait(&self, duration: Duration) -> bool {
        !matches!(self.0.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
    }
}

/// A connected stop handle and signal.
#[must_use]
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = mpsc::channel();
    (StopHandle(Some(tx)), StopSignal(rx))
}

/// Timing of the scan loop, from `[worker]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerTiming {
    pub scan_interval: Duration,
    pub capture_secs: f64,
    pub empty_capture_pause: Duration,
    pub open_backoff: Duration,
}

impl From<&WorkerConfig> for WorkerTiming {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            scan_interval: Duration::from_millis(config.scan_interval_ms),
            capture_secs: config.capture_secs,
            empty_capture_pause: Duration::from_millis(config.empty_capture_pause_ms),
            open_backoff: Duration::from_millis(config.open_backoff_ms),
        }
    }
}

impl Default for WorkerTiming {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

/// Everything workers share, cloned into each new worker.
#[derive(Clone)]
pub struct WorkerContext {
    pub driver: Arc<dyn RadioDriver>,
    pub detector: Arc<dyn Detector>,
    pub recordings: Option<RecordingWriter>,
    pub events: UnboundedSender<DetectionEvent>,
    pub timing: WorkerTiming,
}

/// Bookkeeping the supervisor keeps for one running worker.
///
/// The supervisor never touches the radio through it; the slot clone is only
/// used to force-release a handle when the worker fails to stop in time.
pub struct WorkerHandle {
    pub descriptor: DeviceDescriptor,
    pub stop: StopHandle,
    pub phase: PhaseCell,
    pub slot: HandleSlot,
    pub thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Whether the worker thread is alive and has not reached [`WorkerPhase::Stopped`].
    ///
    /// `Starting` and `Closing` count as live: liveness tracks the thread, not the scan phase.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.thread.is_finished() && self.phase.get() != WorkerPhase::Stopped
    }
}

/// Frequency visited on iteration `cycle_index` of `rotation`.
#[must_use]
pub fn target_for(rotation: &[RotationEntry], cycle_index: u64) -> Option<RotationEntry> {
    let len = u64::try_from(rotation.len()).ok().filter(|&len| len > 0)?;
    let index = usize::try_from(cycle_index % len).ok()?;
    rotation.get(index).copied()
}

enum Step {
    Idle,
    EmptyCapture,
    Captured,
}

enum ScanExit {
    Cancelled,
    Fault(HardwareError),
}

/// The state machine driving one device.
pub struct ScanWorker {
    descriptor: DeviceDescriptor,
    context: WorkerContext,
    snapshots: SnapshotProvider,
    slot: HandleSlot,
    phase: PhaseCell,
    /// Never reset while the worker lives.
    cycle_index: u64,
}

impl ScanWorker {
    /// Starts a worker thread for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn spawn(
        context: WorkerContext,
        descriptor: DeviceDescriptor,
        snapshots: SnapshotProvider,
    ) -> io::Result<WorkerHandle> {
        let (stop, signal) = stop_channel();
        let slot = HandleSlot::new(&descriptor.id);
        let phase = PhaseCell::new();
        let worker = Self {
            descriptor: descriptor.clone(),
            context,
            snapshots,
            slot: slot.clone(),
            phase: phase.clone(),
            cycle_index: 0,
        };
        let span = info_span!("worker", device = %descriptor.id);
        let thread = thread::Builder::new()
            .name(format!("scan-{}", descriptor.id))
            .spawn(move || {
                let _entered = span.enter();
                worker.run(&signal);
            })?;
        Ok(WorkerHandle {
            descriptor,
            stop,
            phase,
            slot,
            thread,
        })
    }

    fn run(mut self, stop: &StopSignal) {
        info!("Starting scan worker for {}", self.descriptor);
        loop {
            self.phase.set(WorkerPhase::Opening);
            if stop.is_cancelled() {
                break;
            }
            if let Err(e) = self.open() {
                error!("{e}");
                // hand the retry back to the supervisor
                let _cancelled = stop.wait(self.context.timing.open_backoff);
                break;
            }

            self.phase.set(WorkerPhase::Scanning);
            match self.scan(stop) {
                ScanExit::Cancelled => break,
                ScanExit::Fault(e) => {
                    self.phase.set(WorkerPhase::Reopening);
                    warn!("{e}, re-initializing device");
                    self.slot.release();
                    if stop.wait(self.context.timing.open_backoff) {
                        break;
                    }
                }
            }
        }
        self.phase.set(WorkerPhase::Closing);
        self.slot.release();
        self.phase.set(WorkerPhase::Stopped);
        info!("Scan worker for {} stopped", self.descriptor.id);
    }

    fn open(&self) -> Result<(), HardwareError> {
        let handle = self.context.driver.open(&self.descriptor)?;
        self.slot.install(handle)
    }

    fn scan(&mut self, stop: &StopSignal) -> ScanExit {
        loop {
            if stop.is_cancelled() {
                return ScanExit::Cancelled;
            }
            let rotation = self.snapshots.current_snapshot().active_rotation();
            let pause = match self.step(&rotation) {
                Ok(Step::Idle) => {
                    debug!("No scan categories enabled, idling");
                    self.context.timing.scan_interval
                }
                Ok(Step::EmptyCapture) => self.context.timing.empty_capture_pause,
                Ok(Step::Captured) => self.context.timing.scan_interval,
                Err(e) => return ScanExit::Fault(e),
            };
            if stop.wait(pause) {
                return ScanExit::Cancelled;
            }
        }
    }

    fn step(&mut self, rotation: &[RotationEntry]) -> Result<Step, HardwareError> {
        let Some(target) = target_for(rotation, self.cycle_index) else {
            return Ok(Step::Idle);
        };
        self.cycle_index = self.cycle_index.wrapping_add(1);

        let sample_count = self.descriptor.samples_for(self.context.timing.capture_secs);
        let block = self.slot.with(|radio| {
            radio.tune(target.frequency_hz)?;
            radio.capture(sample_count)
        })?;
        if block.is_empty() {
            debug!(
                "Empty capture at {:.3} MHz, skipping",
                f64::from(target.frequency_hz) / 1e6
            );
            return Ok(Step::EmptyCapture);
        }
        debug!(
            frequency_hz = target.frequency_hz,
            category = %target.category,
            power_dbfs = block.power_dbfs(),
            "Captured {} samples",
            block.len()
        );

        if let Some(detection) =
            self.context
                .detector
                .detect(target.category, target.frequency_hz, &block)
        {
            self.emit(target, &block, detection);
        }
        Ok(Step::Captured)
    }

    fn emit(&self, target: RotationEntry, block: &SampleBlock, detection: Detection) {
        let detected_at = Utc::now();
        let raw_artifact_ref = self.context.recordings.as_ref().and_then(|writer| {
            writer
                .save(
                    &self.descriptor.id,
                    target.category,
                    target.frequency_hz,
                    block,
                    detected_at,
                )
                .inspect_err(|e| warn!("Recording not saved: {e:#}"))
                .ok()
        });
        info!(
            category = %target.category,
            frequency_hz = target.frequency_hz,
            "Detected: {}",
            detection.decoded_text
        );
        let event = DetectionEvent {
            device_id: self.descriptor.id.clone(),
            frequency_hz: target.frequency_hz,
            category: target.category,
            raw_artifact_ref,
            decoded_text: detection.decoded_text,
            callsign: detection.callsign,
            notes: detection.notes,
            detected_at,
        };
        if self.context.events.send(event).is_err() {
            debug!("Message relay is gone, dropping detection");
        }
    }
}
