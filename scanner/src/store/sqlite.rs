//! `SQLite` backed message store.

use std::path::Path;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{
    FromRow,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use tracing::debug;

use hfscan_common::{MessageRecord, NewMessage, ScanCategory};

use super::{MessageStore, RecentQuery, StoreError};

#[derive(Debug, FromRow)]
struct MessageRow {
    id: i64,
    category: String,
    device_id: String,
    frequency_hz: i64,
    mode: String,
    message_type: String,
    callsign: Option<String>,
    raw_content_path: Option<String>,
    decoded_text: String,
    notes: Option<String>,
    detected_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let category: ScanCategory =
            row.category
                .parse()
                .map_err(|e: hfscan_common::UnknownCategory| StoreError::InvalidRow {
                    id: row.id,
                    reason: e.to_string(),
                })?;
        let frequency_hz = u32::try_from(row.frequency_hz).map_err(|_| StoreError::InvalidRow {
            id: row.id,
            reason: format!("frequency {} out of range", row.frequency_hz),
        })?;
        Ok(Self {
            id: row.id,
            category,
            device_id: row.device_id,
            frequency_hz,
            mode: row.mode,
            message_type: row.message_type,
            callsign: row.callsign,
            raw_content_path: row.raw_content_path,
            decoded_text: row.decoded_text,
            notes: row.notes,
            detected_at: row.detected_at,
        })
    }
}

/// Message store in a local `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) and migrates the database at `path`.
    ///
    /// `:memory:` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let pool = if path == Path::new(":memory:") {
            // a second connection would see a different, empty database
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::new().in_memory(true))
                .await?
        } else {
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().connect_with(options).await?
        };
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    async fn insert_message(&self, message: NewMessage) -> Result<MessageRecord, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (
                category, device_id, frequency_hz, mode, message_type,
                callsign, raw_content_path, decoded_text, notes, detected_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.category.key())
        .bind(&message.device_id)
        .bind(i64::from(message.frequency_hz))
        .bind(&message.mode)
        .bind(&message.message_type)
        .bind(&message.callsign)
        .bind(&message.raw_content_path)
        .bind(&message.decoded_text)
        .bind(&message.notes)
        .bind(message.detected_at)
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();
        debug!(id, category = %message.category, "Message stored");
        Ok(message.with_id(id))
    }

    async fn recent_messages(&self, query: RecentQuery) -> Result<Vec<MessageRecord>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, category, device_id, frequency_hz, mode, message_type,
                   callsign, raw_content_path, decoded_text, notes, detected_at
            FROM messages
            WHERE (?1 IS NULL OR category = ?1)
              AND (?2 IS NULL OR device_id = ?2)
            ORDER BY detected_at DESC, id DESC
            LIMIT ?3
            "#,
        )
        .bind(query.category.map(ScanCategory::key))
        .bind(query.device_id)
        .bind(i64::from(query.limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MessageRecord::try_from).collect()
    }

    async fn delete_message(&self, category: ScanCategory, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ? AND category = ?")
            .bind(id)
            .bind(category.key())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl MessageStore for SqliteStore {
    fn insert(&self, message: NewMessage) -> BoxFuture<'_, Result<MessageRecord, StoreError>> {
        Box::pin(self.insert_message(message))
    }

    fn recent(&self, query: RecentQuery) -> BoxFuture<'_, Result<Vec<MessageRecord>, StoreError>> {
        Box::pin(self.recent_messages(query))
    }

    fn delete(&self, category: ScanCategory, id: i64) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(self.delete_message(category, id))
    }
}
