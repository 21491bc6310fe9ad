//! Replaying queued actions against the remote gateway.

use std::collections::HashMap;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{OfflineQueue, QueueItem, QueuedAction};
use crate::chat::ChatRepository;
use crate::error::CompanionResult;
use crate::gateway::RemoteGateway;
use crate::types::{Message, MessageStatus};

/// Summary of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Items delivered and applied locally
    pub synced: usize,
    /// Items that failed and stay queued
    pub failed: usize,
    /// Items discarded (unknown action, malformed payload, too many attempts)
    pub dropped: usize,
    /// Items left in the queue after the pass
    pub remaining: usize,
    /// Whether the pass stopped early on cancellation
    pub cancelled: bool,
}

enum Outcome {
    Synced,
    Dropped,
    Failed { attempts: u32 },
}

impl OfflineQueue {
    /// Deliver pending items in FIFO order.
    ///
    /// A failing item is logged and kept for the next pass; the remaining
    /// items are still attempted. Only errors reading or writing the queue
    /// file itself are returned. `cancel` is checked between items.
    pub async fn drain_and_sync<G: RemoteGateway>(
        &self,
        gateway: &G,
        chats: &ChatRepository,
        cancel: &CancellationToken,
    ) -> CompanionResult<DrainReport> {
        let _draining = self.inner.draining.lock().await;

        let snapshot = {
            let _guard = self.inner.lock.lock().await;
            self.load_items().await?
        };
        if snapshot.is_empty() {
            return Ok(DrainReport::default());
        }
        info!(pending = snapshot.len(), "Draining offline queue");

        let mut report = DrainReport::default();
        let mut outcomes: HashMap<String, Outcome> = HashMap::new();

        for item in &snapshot {
            if cancel.is_cancelled() {
                info!("Offline queue drain cancelled");
                report.cancelled = true;
                break;
            }

            let outcome = self.process(item, gateway, chats).await;
            match &outcome {
                Outcome::Synced => report.synced += 1,
                Outcome::Dropped => report.dropped += 1,
                Outcome::Failed { .. } => report.failed += 1,
            }
            outcomes.insert(item.id.clone(), outcome);
        }

        // Merge with the file as it is now: items enqueued during the pass
        // must survive the write.
        let _guard = self.inner.lock.lock().await;
        let mut retained = Vec::new();
        for mut item in self.load_items().await? {
            match outcomes.get(&item.id) {
                Some(Outcome::Synced | Outcome::Dropped) => {}
                Some(Outcome::Failed { attempts }) => {
                    item.attempts = *attempts;
                    retained.push(item);
                }
                None => retained.push(item),
            }
        }
        self.save_items(&retained).await?;
        report.remaining = retained.len();

        info!(
            synced = report.synced,
            failed = report.failed,
            dropped = report.dropped,
            remaining = report.remaining,
            "Offline queue drained"
        );
        Ok(report)
    }

    async fn process<G: RemoteGateway>(
        &self,
        item: &QueueItem,
        gateway: &G,
        chats: &ChatRepository,
    ) -> Outcome {
        let action = match item.decode() {
            Ok(Some(action)) => action,
            Ok(None) => {
                warn!(action = %item.action, id = %item.id, "Dropping queued item with unknown action");
                return Outcome::Dropped;
            }
            Err(e) => {
                warn!(action = %item.action, id = %item.id, error = %e, "Dropping malformed queued item");
                return Outcome::Dropped;
            }
        };

        match deliver(&action, item, gateway, chats).await {
            Ok(()) => {
                debug!(action = %item.action, id = %item.id, "Synced offline action");
                Outcome::Synced
            }
            Err(e) => {
                let attempts = item.attempts.saturating_add(1);
                if attempts >= self.inner.max_attempts {
                    warn!(
                        action = %item.action,
                        id = %item.id,
                        attempts,
                        error = %e,
                        "Dropping queued item after repeated failures"
                    );
                    Outcome::Dropped
                } else {
                    error!(action = %item.action, id = %item.id, attempts, error = %e, "Failed to sync offline action");
                    Outcome::Failed { attempts }
                }
            }
        }
    }
}

/// Perform the remote call and apply its local side effect.
async fn deliver<G: RemoteGateway>(
    action: &QueuedAction,
    item: &QueueItem,
    gateway: &G,
    chats: &ChatRepository,
) -> CompanionResult<()> {
    match action {
        QueuedAction::SendMessage(p) => {
            let reply = gateway
                .send_message(&p.user_id, &p.text, &p.history, &p.params)
                .await?;
            let mut exchange = vec![Message::new(&p.user_id, &p.text)?
                .with_timestamp(item.timestamp)
                .with_status(MessageStatus::Delivered)];
            if !reply.trim().is_empty() {
                exchange.push(Message::reply(reply)?);
            }
            chats.append(&p.user_id, &exchange).await
        }
        QueuedAction::SendAudio(p) => {
            let reply = gateway.send_audio(&p.user_id, &p.file_path).await?;
            if reply.trim().is_empty() {
                return Ok(());
            }
            chats.append(&p.user_id, &[Message::reply(reply)?]).await
        }
        QueuedAction::CreateDiaryEntry(p) => gateway.create_diary_entry(&p.user_id, &p.entry).await,
    }
}
