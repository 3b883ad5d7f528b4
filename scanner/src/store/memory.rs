//! Message store kept in process memory.

use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::{self, BoxFuture};

use hfscan_common::{MessageRecord, NewMessage, ScanCategory};

use super::{MessageStore, RecentQuery, StoreError};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    messages: Vec<MessageRecord>,
}

/// Non-persistent store, used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageStore for MemoryStore {
    fn insert(&self, message: NewMessage) -> BoxFuture<'_, Result<MessageRecord, StoreError>> {
        let record = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let record = message.with_id(inner.next_id);
            inner.messages.push(record.clone());
            record
        };
        Box::pin(future::ready(Ok(record)))
    }

    fn recent(&self, query: RecentQuery) -> BoxFuture<'_, Result<Vec<MessageRecord>, StoreError>> {
        let mut found: Vec<MessageRecord> = self
            .lock()
            .messages
            .iter()
            .filter(|m| query.category.is_none_or(|c| m.category == c))
            .filter(|m| query.device_id.as_ref().is_none_or(|d| m.device_id == *d))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.detected_at
                .cmp(&a.detected_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        found.truncate(query.limit as usize);
        Box::pin(future::ready(Ok(found)))
    }

    fn delete(&self, category: ScanCategory, id: i64) -> BoxFuture<'_, Result<bool, StoreError>> {
        let removed = {
            let mut inner = self.lock();
            let before = inner.messages.len();
            inner
                .messages
                .retain(|m| !(m.id == id && m.category == category));
            inner.messages.len() != before
        };
        Box::pin(future::ready(Ok(removed)))
    }
}
