//! Reconciles running workers against the selected, detected devices.
//!
//! The supervisor owns every [`WorkerHandle`]. Each tick it enumerates devices,
//! resolves the selection from a fresh config snapshot, stops workers that are no
//! longer wanted and starts the missing ones. Workers that exited on their own
//! (failed open) are reaped and started again on the next tick.

use alloc::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use core::time::Duration;
use std::thread::{self, JoinHandle, ThreadId};

use futures::future;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use hfscan_common::DeviceState;

use super::worker::{ScanWorker, WorkerContext, WorkerHandle, WorkerPhase};
use crate::{
    config::{ConfigSnapshot, SnapshotProvider},
    hardware::HardwareError,
    registry::{DeviceRegistry, Enumeration},
};

/// How often a stopping worker is checked for completion.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What one reconciliation pass saw and did.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: Arc<ConfigSnapshot>,
    pub detected: Vec<String>,
    pub selected: Vec<String>,
    pub enumeration_fault: Option<HardwareError>,
    pub started: Vec<String>,
    pub stopped: Vec<String>,
}

pub struct Supervisor {
    registry: DeviceRegistry,
    snapshots: SnapshotProvider,
    context: WorkerContext,
    join_timeout: Duration,
    workers: BTreeMap<String, WorkerHandle>,
    /// Threads that did not stop within the join timeout, per device.
    ///
    /// No new worker is started for a device while one of its threads drains.
    draining: BTreeMap<String, Vec<JoinHandle<()>>>,
}

impl Supervisor {
    #[must_use]
    pub fn new(
        registry: DeviceRegistry,
        snapshots: SnapshotProvider,
        context: WorkerContext,
        join_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            snapshots,
            context,
            join_timeout,
            workers: BTreeMap::new(),
            draining: BTreeMap::new(),
        }
    }

    /// Runs one reconciliation pass.
    #[tracing::instrument(skip_all)]
    pub async fn tick(&mut self) -> TickReport {
        self.reap_draining();

        let Enumeration {
            devices: detected,
            fault: enumeration_fault,
        } = self.registry.list_devices();
        let snapshot = self.snapshots.current_snapshot();
        let selected = snapshot.selection_policy.resolve(&detected);
        let desired: BTreeSet<&str> = selected.iter().map(String::as_str).collect();

        self.reap_exited();

        let to_stop: Vec<String> = self
            .workers
            .iter()
            .filter(|&(id, worker)| {
                if !desired.contains(id.as_str()) {
                    info!("Device {id} is no longer selected or detected, stopping its worker");
                    return true;
                }
                if worker.descriptor != snapshot.device_params.descriptor_for(id) {
                    info!("Radio parameters of {id} changed, restarting its worker");
                    return true;
                }
                false
            })
            .map(|(id, _)| id.clone())
            .collect();
        let handles: Vec<WorkerHandle> = to_stop
            .iter()
            .filter_map(|id| self.workers.remove(id))
            .collect();
        self.stop_workers(handles).await;

        let mut started = Vec::new();
        for id in &selected {
            if self.workers.contains_key(id) {
                continue;
            }
            if self.draining.contains_key(id) {
                warn!("Previous worker for {id} is still shutting down, not starting a new one yet");
                continue;
            }
            if self.start_worker(&snapshot, id) {
                started.push(id.clone());
            }
        }
        if selected.is_empty() {
            debug!("No device is both selected and detected, not scanning");
        }

        TickReport {
            snapshot,
            detected,
            selected,
            enumeration_fault,
            started,
            stopped: to_stop,
        }
    }

    fn start_worker(&mut self, snapshot: &ConfigSnapshot, id: &str) -> bool {
        let descriptor = snapshot.device_params.descriptor_for(id);
        match ScanWorker::spawn(self.context.clone(), descriptor, self.snapshots.fork()) {
            Ok(handle) => {
                self.workers.insert(id.to_string(), handle);
                true
            }
            Err(e) => {
                error!("Failed to spawn worker thread for {id}: {e}");
                false
            }
        }
    }

    /// Drops bookkeeping of workers whose thread has already exited.
    fn reap_exited(&mut self) {
        let exited: Vec<String> = self
            .workers
            .iter()
            .filter(|&(_, worker)| worker.thread.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        for id in exited {
            let Some(worker) = self.workers.remove(&id) else {
                continue;
            };
            if worker.thread.join().is_err() {
                error!("Worker thread for {id} panicked");
            }
            worker.slot.retire();
            info!("Worker for {id} exited, it will be restarted while the device stays selected");
        }
    }

    fn reap_draining(&mut self) {
        self.draining.retain(|id, threads| {
            let (finished, running): (Vec<_>, Vec<_>) =
                threads.drain(..).partition(JoinHandle::is_finished);
            for thread in finished {
                if thread.join().is_err() {
                    error!("Worker thread for {id} panicked");
                }
                info!("Late worker for {id} has finally stopped");
            }
            *threads = running;
            !threads.is_empty()
        });
    }

    /// Signals every worker, then waits for all of them concurrently.
    async fn stop_workers(&mut self, mut handles: Vec<WorkerHandle>) {
        if handles.is_empty() {
            return;
        }
        for handle in &mut handles {
            handle.stop.cancel();
        }
        let timeout = self.join_timeout;
        let results =
            future::join_all(handles.into_iter().map(|h| join_with_timeout(h, timeout))).await;
        for (id, leftover) in results {
            if let Some(thread) = leftover {
                self.draining.entry(id).or_default().push(thread);
            }
        }
    }

    /// Stops every worker. Used on shutdown.
    pub async fn shutdown(&mut self) {
        let handles: Vec<WorkerHandle> = core::mem::take(&mut self.workers).into_values().collect();
        info!("Stopping {} worker(s)", handles.len());
        self.stop_workers(handles).await;
        self.reap_draining();
        if !self.draining.is_empty() {
            warn!(
                "Workers still running at shutdown: {:?}",
                self.draining.keys().collect::<Vec<_>>()
            );
        }
    }

    /// Liveness of every tracked worker, read at call time.
    #[must_use]
    pub fn device_states(&self) -> BTreeMap<String, DeviceState> {
        self.workers
            .iter()
            .map(|(id, worker)| {
                let state = if worker.is_live() {
                    DeviceState::Active
                } else {
                    DeviceState::Inactive
                };
                (id.clone(), state)
            })
            .collect()
    }

    /// Ids of devices with a live worker.
    #[must_use]
    pub fn running_devices(&self) -> Vec<String> {
        self.workers
            .iter()
            .filter(|&(_, worker)| worker.is_live())
            .map(|(id, _)| id.clone())
            .collect()
    }

    #[must_use]
    pub fn worker_phase(&self, id: &str) -> Option<WorkerPhase> {
        self.workers.get(id).map(|worker| worker.phase.get())
    }

    /// Thread of the worker for `id`, to tell a restarted worker from a kept one.
    #[must_use]
    pub fn worker_thread(&self, id: &str) -> Option<ThreadId> {
        self.workers.get(id).map(|worker| worker.thread.thread().id())
    }

    /// Devices with a worker thread that outlived its join timeout.
    #[must_use]
    pub fn draining_devices(&self) -> Vec<String> {
        self.draining.keys().cloned().collect()
    }
}

/// Waits up to `timeout` for a signalled worker.
///
/// On timeout the hardware handle is force-released and the thread is returned
/// so the caller can keep track of it.
async fn join_with_timeout(
    handle: WorkerHandle,
    timeout: Duration,
) -> (String, Option<JoinHandle<()>>) {
    let id = handle.descriptor.id.clone();
    let deadline = Instant::now() + timeout;
    while !handle.thread.is_finished() {
        if Instant::now() >= deadline {
            warn!(
                "Worker for {id} did not stop within {:?}, releasing its hardware handle anyway",
                timeout
            );
            // retiring blocks while the worker is inside a capture
            let slot = handle.slot.clone();
            if let Err(e) = thread::Builder::new()
                .name(format!("release-{id}"))
                .spawn(move || {
                    slot.retire();
                })
            {
                error!("Failed to spawn release thread for {id}: {e}");
            }
            return (id, Some(handle.thread));
        }
        sleep(JOIN_POLL_INTERVAL).await;
    }
    if handle.thread.join().is_err() {
        error!("Worker thread for {id} panicked");
    }
    // no-op unless the worker died without releasing
    handle.slot.retire();
    debug!("Worker for {id} joined");
    (id, None)
}
