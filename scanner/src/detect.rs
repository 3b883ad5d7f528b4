//! The detection hook run on every captured block.
//!
//! Real demodulation is not part of the scanner. [`Detector`] is the seam where a
//! decoder plugs in; [`SimulatedDetector`] stands in for one and produces periodic
//! fake hits so the rest of the pipeline can be exercised.

use chrono::{DateTime, Utc};

use hfscan_common::{NewMessage, ScanCategory};

use crate::hardware::SampleBlock;

/// What a detector found in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub decoded_text: String,
    pub callsign: Option<String>,
    pub notes: Option<String>,
}

/// Decides whether a captured block contains a message.
pub trait Detector: Send + Sync {
    fn detect(
        &self,
        category: ScanCategory,
        frequency_hz: u32,
        block: &SampleBlock,
    ) -> Option<Detection>;
}

/// A detection produced by a worker, on its way to the message relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionEvent {
    pub device_id: String,
    pub frequency_hz: u32,
    pub category: ScanCategory,
    /// Saved capture, relative to the web data directory.
    pub raw_artifact_ref: Option<String>,
    pub decoded_text: String,
    pub callsign: Option<String>,
    pub notes: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl DetectionEvent {
    #[must_use]
    pub fn into_new_message(self) -> NewMessage {
        NewMessage {
            category: self.category,
            mode: self.category.mode().to_string(),
            message_type: self.category.message_type().to_string(),
            device_id: self.device_id,
            frequency_hz: self.frequency_hz,
            callsign: self.callsign,
            raw_content_path: self.raw_artifact_ref,
            decoded_text: self.decoded_text,
            notes: self.notes,
            detected_at: self.detected_at,
        }
    }
}

/// Seconds of every period during which the simulated detector fires.
const SIMULATED_WINDOW_SECS: i64 = 2;

/// Fake decoder: fires during a short window of a per-category period.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedDetector;

impl SimulatedDetector {
    const fn period_secs(category: ScanCategory) -> i64 {
        match category {
            ScanCategory::PrimaryVoice => 30,
            ScanCategory::DigitalText => 40,
            ScanCategory::Adsb => 20,
        }
    }

    /// Whether a hit is simulated for `category` at `at`.
    #[must_use]
    pub fn fires_at(category: ScanCategory, at: DateTime<Utc>) -> bool {
        at.timestamp().rem_euclid(Self::period_secs(category)) < SIMULATED_WINDOW_SECS
    }

    fn detection(category: ScanCategory, frequency_hz: u32) -> Detection {
        let (text, callsign) = match category {
            ScanCategory::PrimaryVoice => ("Simulated HFGCS Voice Message: 'TEST TEST, OVER!'", "DUMMY_C"),
            ScanCategory::DigitalText => ("Simulated JS8 Message: 'CQ CQ CQ DE K1SPY'", "K1SPY"),
            ScanCategory::Adsb => ("Simulated ADS-B position: RCH123 FL350", "RCH123"),
        };
        Detection {
            decoded_text: text.to_string(),
            callsign: Some(callsign.to_string()),
            notes: Some(format!(
                "Simulated {} message on {:.1} kHz.",
                category.message_type(),
                f64::from(frequency_hz) / 1e3
            )),
        }
    }
}

impl Detector for SimulatedDetector {
    fn detect(
        &self,
        category: ScanCategory,
        frequency_hz: u32,
        block: &SampleBlock,
    ) -> Option<Detection> {
        if !block.power_dbfs().is_finite() || !Self::fires_at(category, Utc::now()) {
            return None;
        }
        Some(Self::detection(category, frequency_hz))
    }
}
