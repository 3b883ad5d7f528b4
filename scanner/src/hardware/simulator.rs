//! Built-in simulated receivers.
//!
//! Lets the scanner run end to end without attached hardware. Samples are
//! deterministic pseudo-noise around the 8-bit midpoint.

use alloc::collections::BTreeSet;

use tracing::{debug, info};

use super::{DeviceDescriptor, HardwareError, RadioDriver, RadioHandle, SampleBlock};
use crate::config::SimulatorConfig;

/// A driver exposing the devices listed under `[simulator]`.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDriver {
    devices: Vec<String>,
    fail_open: BTreeSet<String>,
    capture_fault_every: Option<u32>,
}

impl SimulatedDriver {
    #[must_use]
    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self {
            devices: config.devices.clone(),
            fail_open: config.fail_open.iter().cloned().collect(),
            capture_fault_every: config.capture_fault_every.filter(|&n| n > 0),
        }
    }
}

impl RadioDriver for SimulatedDriver {
    fn enumerate(&self) -> Result<Vec<String>, HardwareError> {
        Ok(self.devices.clone())
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn RadioHandle>, HardwareError> {
        let reason = if !self.devices.contains(&descriptor.id) {
            Some("no such device")
        } else if self.fail_open.contains(&descriptor.id) {
            Some("device busy")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(HardwareError::Open {
                device: descriptor.id.clone(),
                reason: reason.to_string(),
            });
        }
        info!("Simulated SDR opened: {descriptor}");
        Ok(Box::new(SimulatedHandle {
            device: descriptor.id.clone(),
            frequency_hz: descriptor.center_freq_hz.round() as u32,
            captures: 0,
            capture_fault_every: self.capture_fault_every,
            noise: seed_for(&descriptor.id),
        }))
    }
}

struct SimulatedHandle {
    device: String,
    frequency_hz: u32,
    captures: u32,
    capture_fault_every: Option<u32>,
    noise: u64,
}

/// Seed derived from the serial so each device produces its own stream.
fn seed_for(device: &str) -> u64 {
    device
        .bytes()
        .fold(0x9E37_79B9_7F4A_7C15, |acc, b| {
            (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01B3)
        })
        | 1
}

impl SimulatedHandle {
    fn next_noise(&mut self) -> u8 {
        // xorshift64
        let mut x = self.noise;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.noise = x;
        // keep the noise floor low: +-8 around the midpoint
        (120 + (x >> 60)) as u8
    }
}

impl RadioHandle for SimulatedHandle {
    fn tune(&mut self, frequency_hz: u32) -> Result<(), HardwareError> {
        self.frequency_hz = frequency_hz;
        debug!(
            "Simulated SDR {} tuned to {:.3} MHz",
            self.device,
            f64::from(frequency_hz) / 1e6
        );
        Ok(())
    }

    fn capture(&mut self, sample_count: usize) -> Result<SampleBlock, HardwareError> {
        self.captures = self.captures.wrapping_add(1);
        if let Some(every) = self.capture_fault_every
            && self.captures % every == 0
        {
            return Err(HardwareError::Capture {
                device: self.device.clone(),
                reason: "simulated USB transfer error".to_string(),
            });
        }
        let iq = (0..sample_count.saturating_mul(2))
            .map(|_| self.next_noise())
            .collect();
        Ok(SampleBlock::from_interleaved(iq))
    }

    fn close(self: Box<Self>) {
        info!("Simulated SDR {} closed", self.device);
    }
}
