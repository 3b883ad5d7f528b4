//! Forwards detections to the message store and keeps `messages.json` fresh.

use alloc::sync::Arc;
use std::path::PathBuf;

use eyre::WrapErr as _;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};

use super::telemetry::write_json_atomic;
use crate::{
    detect::DetectionEvent,
    store::{MessageStore, RecentQuery},
};

pub struct MessageRelay {
    store: Arc<dyn MessageStore>,
    /// `None` disables the export, used by tests.
    messages_file: Option<PathBuf>,
    export_limit: u32,
}

impl MessageRelay {
    #[must_use]
    pub fn new(
        store: Arc<dyn MessageStore>,
        messages_file: Option<PathBuf>,
        export_limit: u32,
    ) -> Self {
        Self {
            store,
            messages_file,
            export_limit,
        }
    }

    /// Persists one detection. Returns whether it was stored.
    ///
    /// A failed write is logged and the event is dropped.
    pub async fn relay(&self, event: DetectionEvent) -> bool {
        let device = event.device_id.clone();
        match self.store.insert(event.into_new_message()).await {
            Ok(record) => {
                info!(
                    id = record.id,
                    category = %record.category,
                    device = %device,
                    "Message logged"
                );
                if let Err(e) = self.refresh_export().await {
                    error!("Failed to refresh recent messages export: {e:#}");
                }
                true
            }
            Err(e) => {
                error!(device = %device, "Dropping detection, failed to store it: {:#}", eyre::Report::new(e));
                false
            }
        }
    }

    /// Rewrites the recent-messages export from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried or the file cannot be written.
    pub async fn refresh_export(&self) -> eyre::Result<()> {
        let Some(ref path) = self.messages_file else {
            return Ok(());
        };
        let recent = self
            .store
            .recent(RecentQuery::latest(self.export_limit))
            .await
            .wrap_err("Failed to load recent messages")?;
        let body = serde_json::to_vec_pretty(&recent).wrap_err("Failed to serialize messages")?;
        write_json_atomic(path, body).await?;
        debug!("Exported {} recent messages", recent.len());
        Ok(())
    }

    /// Relays events until every sender is gone.
    pub async fn run(self, mut events: UnboundedReceiver<DetectionEvent>) {
        while let Some(event) = events.recv().await {
            self.relay(event).await;
        }
        debug!("All detection senders closed, message relay stopping");
    }
}
