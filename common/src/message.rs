//! Detected-message records as stored and exported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ScanCategory;

/// A detected message that has been written to the message store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    /// Category the message was detected under; the dashboard uses it to address deletes.
    #[serde(rename = "table_name")]
    pub category: ScanCategory,
    #[serde(rename = "sdr_id")]
    pub device_id: String,
    pub frequency_hz: u32,
    pub mode: String,
    pub message_type: String,
    pub callsign: Option<String>,
    /// Path of the saved capture, relative to the web data directory.
    pub raw_content_path: Option<String>,
    pub decoded_text: String,
    pub notes: Option<String>,
    #[serde(rename = "timestamp")]
    pub detected_at: DateTime<Utc>,
}

/// A message ready to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub category: ScanCategory,
    pub device_id: String,
    pub frequency_hz: u32,
    pub mode: String,
    pub message_type: String,
    pub callsign: Option<String>,
    pub raw_content_path: Option<String>,
    pub decoded_text: String,
    pub notes: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl NewMessage {
    /// Attaches the store-assigned id.
    #[must_use]
    pub fn with_id(self, id: i64) -> MessageRecord {
        MessageRecord {
            id,
            category: self.category,
            device_id: self.device_id,
            frequency_hz: self.frequency_hz,
            mode: self.mode,
            message_type: self.message_type,
            callsign: self.callsign,
            raw_content_path: self.raw_content_path,
            decoded_text: self.decoded_text,
            notes: self.notes,
            detected_at: self.detected_at,
        }
    }
}
