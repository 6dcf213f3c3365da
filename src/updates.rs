//! Single-slot feed of committed hosts tables.
//!
//! Publishing never blocks: an unconsumed table is replaced by the newer
//! one, so a slow consumer only ever sees the latest state.

use std::sync::Arc;

use tokio::sync::watch;

use crate::hosts::HostTable;

#[derive(Debug, Default)]
struct Slot {
    table: Option<Arc<HostTable>>,
    closed: bool,
}

/// Create a connected pair of update sender and receiver.
#[must_use]
pub fn channel() -> (UpdateSender, UpdateReceiver) {
    let slot = Arc::new(watch::Sender::new(Slot::default()));
    (
        UpdateSender {
            slot: Arc::clone(&slot),
        },
        UpdateReceiver { slot },
    )
}

/// Publishing half of the update channel.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    slot: Arc<watch::Sender<Slot>>,
}

impl UpdateSender {
    /// Publish a table, replacing the one not yet received if any.
    pub fn publish(&self, table: Arc<HostTable>) {
        self.slot.send_if_modified(|slot| {
            if slot.closed {
                tracing::error!("updates channel is closed");
                return false;
            }

            if slot.table.replace(table).is_some() {
                tracing::debug!("replaced unconsumed hosts table");
            }
            true
        });
    }

    /// Close the channel, waking up every waiting receiver.
    pub fn close(&self) {
        self.slot
            .send_if_modified(|slot| !std::mem::replace(&mut slot.closed, true));
    }

    /// Check if the channel is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot.borrow().closed
    }
}

/// Receiving half of the update channel.
///
/// Receivers can be cloned, clones compete for the same slot.
#[derive(Debug, Clone)]
pub struct UpdateReceiver {
    slot: Arc<watch::Sender<Slot>>,
}

impl UpdateReceiver {
    /// Take the pending table without waiting.
    #[must_use]
    pub fn try_recv(&self) -> Option<Arc<HostTable>> {
        let mut taken = None;
        // Taking the table is not a change worth waking receivers for.
        self.slot.send_if_modified(|slot| {
            taken = slot.table.take();
            false
        });
        taken
    }

    /// Wait for the next table.
    ///
    /// Returns `None` once the channel is closed and the slot is drained.
    pub async fn recv(&self) -> Option<Arc<HostTable>> {
        let mut changes = self.slot.subscribe();
        loop {
            if let Some(table) = self.try_recv() {
                return Some(table);
            }
            if self.is_closed() {
                return None;
            }

            changes.changed().await.ok()?;
        }
    }

    /// Check if the channel is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot.borrow().closed
    }
}
