//! Persistent storage of detected messages.
//!
//! All categories share one store; a message's category is part of its record and
//! is what the dashboard uses to address deletes.

mod memory;
mod sqlite;

use alloc::sync::Arc;
use std::path::Path;

use futures::future::BoxFuture;
use thiserror::Error as ThisError;
use tracing::info;

use hfscan_common::{MessageRecord, NewMessage, ScanCategory};

use crate::config::{DbConfig, resolve_config_relative_paths};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("failed to apply database migrations")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("stored message {id} is invalid: {reason}")]
    InvalidRow { id: i64, reason: String },
}

/// Filter for listing recent messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentQuery {
    pub category: Option<ScanCategory>,
    pub device_id: Option<String>,
    pub limit: u32,
}

impl RecentQuery {
    #[must_use]
    pub const fn latest(limit: u32) -> Self {
        Self {
            category: None,
            device_id: None,
            limit,
        }
    }
}

/// Storage backend for detected messages.
pub trait MessageStore: Send + Sync {
    /// Persists a message and returns it with its assigned id.
    fn insert(&self, message: NewMessage) -> BoxFuture<'_, Result<MessageRecord, StoreError>>;

    /// Most recent messages first, newest by detection time.
    fn recent(&self, query: RecentQuery) -> BoxFuture<'_, Result<Vec<MessageRecord>, StoreError>>;

    /// Deletes one message. Returns whether it existed.
    fn delete(&self, category: ScanCategory, id: i64) -> BoxFuture<'_, Result<bool, StoreError>>;
}

/// Opens the store configured under `[db]`.
///
/// Without a `[db]` table, or with `enable = false`, messages live in memory only.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
pub async fn open_store(
    db: Option<&DbConfig>,
    config_path: &Path,
) -> eyre::Result<Arc<dyn MessageStore>> {
    match db {
        Some(db_config) if db_config.enable => {
            let path = resolve_config_relative_paths(config_path, &db_config.path);
            info!("Opening message database at {}", path.display());
            let store = SqliteStore::open(&path).await?;
            Ok(Arc::new(store))
        }
        _ => {
            info!("No persistent database configured, keeping messages in memory");
            Ok(Arc::new(MemoryStore::default()))
        }
    }
}
