//! Where the human-edited settings text comes from.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use thiserror::Error as ThisError;

/// Failure to obtain or understand the settings text.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read settings from {location}")]
    Read {
        location: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse settings")]
    Parse(#[from] toml::de::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// A mutable, human-edited settings store, read in full on every poll.
pub trait SettingsSource: Send + Sync {
    /// Current settings text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the text cannot be obtained.
    fn read(&self) -> Result<String, ConfigError>;

    /// Human readable location, used in log messages.
    fn location(&self) -> String;
}

/// Settings kept in a file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl SettingsSource for FileSource {
    fn read(&self) -> Result<String, ConfigError> {
        fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            location: self.location(),
            source,
        })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Settings held in memory; the text can be replaced at any time.
#[derive(Debug, Default)]
pub struct MemorySource {
    text: Mutex<String>,
}

impl MemorySource {
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            text: Mutex::new(text.to_string()),
        }
    }

    /// Replaces the settings text, as an operator editing the file would.
    pub fn set(&self, text: &str) {
        *self.text.lock().unwrap_or_else(PoisonError::into_inner) = text.to_string();
    }
}

impl SettingsSource for MemorySource {
    fn read(&self) -> Result<String, ConfigError> {
        Ok(self
            .text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
