//! Raw captures saved alongside detected messages.
//!
//! Files hold the interleaved unsigned 8-bit I/Q samples exactly as captured
//! (`.cu8`), so they open directly in common SDR tools.

use std::{fs, path::PathBuf};

use chrono::{DateTime, Utc};
use eyre::WrapErr as _;

use hfscan_common::ScanCategory;

use crate::hardware::SampleBlock;

/// Writes captures into the recordings directory.
#[derive(Debug, Clone)]
pub struct RecordingWriter {
    dir: PathBuf,
    /// Prefix of the reference handed to the dashboard, the directory's own name.
    web_prefix: String,
}

impl RecordingWriter {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        let web_prefix = dir
            .file_name()
            .map_or_else(|| "recordings".to_string(), |n| n.to_string_lossy().into_owned());
        Self { dir, web_prefix }
    }

    /// Saves `block` and returns its reference relative to the web data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file cannot be written.
    pub fn save(
        &self,
        device_id: &str,
        category: ScanCategory,
        frequency_hz: u32,
        block: &SampleBlock,
        at: DateTime<Utc>,
    ) -> eyre::Result<String> {
        let name = file_name(device_id, category, frequency_hz, at);
        fs::create_dir_all(&self.dir).wrap_err(format!(
            "Failed to create recordings directory at: {}",
            self.dir.display()
        ))?;
        let path = self.dir.join(&name);
        fs::write(&path, block.as_bytes())
            .wrap_err(format!("Failed to write recording at: {}", path.display()))?;
        Ok(format!("{}/{name}", self.web_prefix))
    }
}

fn file_name(device_id: &str, category: ScanCategory, frequency_hz: u32, at: DateTime<Utc>) -> String {
    let device: String = device_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!(
        "rec_{device}_{}kHz_{}_{}.cu8",
        frequency_hz / 1000,
        category.mode(),
        at.format("%Y%m%d_%H%M%S")
    )
}
