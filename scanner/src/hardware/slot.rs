//! Exclusive-ownership slot for an open radio handle.

use alloc::sync::Arc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::{HardwareError, RadioHandle};

struct SlotState {
    handle: Option<Box<dyn RadioHandle>>,
    /// Set once the slot has been retired; no handle may be installed afterwards.
    retired: bool,
}

/// Holds the open handle of one worker.
///
/// The worker installs, uses and releases the handle. The supervisor keeps a clone
/// only so it can [`retire`](Self::retire) the slot when a worker does not stop in
/// time. Whoever takes the handle out closes it, so it is closed exactly once.
#[derive(Clone)]
pub struct HandleSlot {
    device: Arc<str>,
    state: Arc<Mutex<SlotState>>,
}

impl HandleSlot {
    #[must_use]
    pub fn new(device: &str) -> Self {
        Self {
            device: Arc::from(device),
            state: Arc::new(Mutex::new(SlotState {
                handle: None,
                retired: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a freshly opened handle.
    ///
    /// # Errors
    ///
    /// If the slot was retired the handle is closed right away and
    /// [`HardwareError::Released`] is returned.
    pub fn install(&self, handle: Box<dyn RadioHandle>) -> Result<(), HardwareError> {
        let mut state = self.lock();
        if state.retired {
            drop(state);
            handle.close();
            return Err(HardwareError::Released(self.device.to_string()));
        }
        if let Some(previous) = state.handle.replace(handle) {
            warn!(device = %self.device, "Replacing a handle that was never released");
            previous.close();
        }
        Ok(())
    }

    /// Runs `f` against the held handle.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Released`] if no handle is held, otherwise whatever `f` returns.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut dyn RadioHandle) -> Result<R, HardwareError>,
    ) -> Result<R, HardwareError> {
        let mut state = self.lock();
        match state.handle.as_mut() {
            Some(handle) => f(&mut **handle),
            None => Err(HardwareError::Released(self.device.to_string())),
        }
    }

    /// Closes the held handle, if any. Returns whether a handle was closed.
    pub fn release(&self) -> bool {
        let taken = self.lock().handle.take();
        taken.is_some_and(|handle| {
            handle.close();
            debug!(device = %self.device, "Hardware handle closed");
            true
        })
    }

    /// Releases the handle and refuses any later [`install`](Self::install).
    ///
    /// Blocks while the owning worker is inside a hardware call.
    pub fn retire(&self) -> bool {
        let taken = {
            let mut state = self.lock();
            state.retired = true;
            state.handle.take()
        };
        taken.is_some_and(|handle| {
            handle.close();
            warn!(device = %self.device, "Hardware handle force-released");
            true
        })
    }
}
