//! Radio hardware seam.
//!
//! The scanner talks to receivers only through [`RadioDriver`] and [`RadioHandle`].
//! A [`RadioHandle`] is owned by exactly one worker; the worker keeps it in a
//! [`HandleSlot`] so the handle is closed exactly once, whoever gets there first.

mod simulator;
mod slot;

use core::fmt;

use thiserror::Error as ThisError;

use crate::config::Gain;

pub use simulator::SimulatedDriver;
pub use slot::HandleSlot;

/// Radio parameters a worker opens its device with.
///
/// Immutable for the life of a worker; a change means the worker is restarted.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    /// Serial number (or index) of the device.
    pub id: String,
    pub sample_rate: f64,
    pub center_freq_hz: f64,
    pub gain: Gain,
    pub ppm_correction: i32,
}

impl DeviceDescriptor {
    /// Number of samples covering `secs` seconds at this descriptor's sample rate.
    #[must_use]
    pub fn samples_for(&self, secs: f64) -> usize {
        (self.sample_rate * secs).max(0.0).round() as usize
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2} Msps, {:.3} MHz, gain {}, ppm {})",
            self.id,
            self.sample_rate / 1e6,
            self.center_freq_hz / 1e6,
            match self.gain {
                Gain::Auto => "auto".to_string(),
                Gain::Db(db) => format!("{db} dB"),
            },
            self.ppm_correction
        )
    }
}

/// Faults reported by the hardware layer.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum HardwareError {
    #[error("device enumeration failed: {0}")]
    Enumeration(String),
    #[error("failed to open device '{device}': {reason}")]
    Open { device: String, reason: String },
    #[error("failed to tune device '{device}' to {frequency_hz} Hz: {reason}")]
    Tune {
        device: String,
        frequency_hz: u32,
        reason: String,
    },
    #[error("capture failed on device '{device}': {reason}")]
    Capture { device: String, reason: String },
    #[error("hardware handle for '{0}' has been released")]
    Released(String),
}

/// A block of interleaved unsigned 8-bit I/Q samples, as RTL-SDR devices deliver them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleBlock {
    iq: Vec<u8>,
}

impl SampleBlock {
    /// Wraps interleaved I/Q bytes. A trailing odd byte is dropped.
    #[must_use]
    pub fn from_interleaved(mut iq: Vec<u8>) -> Self {
        if iq.len() % 2 != 0 {
            iq.pop();
        }
        Self { iq }
    }

    /// Number of complex samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iq.len() / 2
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iq.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.iq
    }

    /// Coarse received level: mean sample power relative to full scale.
    ///
    /// Returns negative infinity for an empty block.
    #[must_use]
    pub fn power_dbfs(&self) -> f64 {
        const MID: f64 = 127.5;
        if self.is_empty() {
            return f64::NEG_INFINITY;
        }
        let sum: f64 = self
            .iq
            .chunks_exact(2)
            .map(|pair| match *pair {
                [i, q] => {
                    let i = (f64::from(i) - MID) / MID;
                    let q = (f64::from(q) - MID) / MID;
                    i * i + q * q
                }
                _ => 0.0,
            })
            .sum();
        10.0 * (sum / self.len() as f64).log10()
    }
}

/// Enumerates and opens receivers.
pub trait RadioDriver: Send + Sync {
    /// Serials of all attached devices.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Enumeration`] if the hardware cannot be queried.
    fn enumerate(&self) -> Result<Vec<String>, HardwareError>;

    /// Opens and configures a device for exclusive use.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Open`] if the device is missing, busy or rejects the parameters.
    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn RadioHandle>, HardwareError>;
}

/// An open receiver.
pub trait RadioHandle: Send {
    /// Retunes the receiver.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Tune`] if the tuner rejects the frequency.
    fn tune(&mut self, frequency_hz: u32) -> Result<(), HardwareError>;

    /// Reads `sample_count` complex samples. An empty block is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Capture`] if the device stops delivering samples.
    fn capture(&mut self, sample_count: usize) -> Result<SampleBlock, HardwareError>;

    /// Releases the device.
    fn close(self: Box<Self>);
}
