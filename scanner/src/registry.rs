//! Discovery of attached receivers.

use alloc::sync::Arc;

use tracing::{debug, error};

use crate::hardware::{HardwareError, RadioDriver};

/// Result of one enumeration.
///
/// Enumeration fails soft: on error `devices` is empty and `fault` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    /// Sorted, de-duplicated serials.
    pub devices: Vec<String>,
    pub fault: Option<HardwareError>,
}

/// Lists the devices the driver can see.
#[derive(Clone)]
pub struct DeviceRegistry {
    driver: Arc<dyn RadioDriver>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(driver: Arc<dyn RadioDriver>) -> Self {
        Self { driver }
    }

    /// Queries the hardware. Never fails; see [`Enumeration`].
    #[must_use]
    pub fn list_devices(&self) -> Enumeration {
        match self.driver.enumerate() {
            Ok(mut devices) => {
                devices.retain(|d| !d.trim().is_empty());
                devices.sort();
                devices.dedup();
                debug!("Detected SDRs: {:?}", devices);
                Enumeration {
                    devices,
                    fault: None,
                }
            }
            Err(e) => {
                error!("SDR enumeration failed, treating as no devices: {e}");
                Enumeration {
                    devices: Vec::new(),
                    fault: Some(e),
                }
            }
        }
    }
}
