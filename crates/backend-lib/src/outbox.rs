// ============================
// crates/backend-lib/src/outbox.rs
// ============================
//! Per-session queue of packets waiting for the next poll.
//!
//! This is the only way one session's request affects another session's
//! response. There is no push; a packet is delivered when its recipient polls.
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics::{OUTBOX_DEPTH, OUTBOX_OVER_LIMIT};
use crate::storage::{keys, Storage};

#[derive(Clone)]
pub struct PacketOutbox {
    storage: Arc<dyn Storage>,
    soft_limit: usize,
    ttl: Duration,
}

impl PacketOutbox {
    /// `ttl` bounds how long packets for a session that stopped polling are kept.
    pub fn new(storage: Arc<dyn Storage>, soft_limit: usize, ttl: Duration) -> Self {
        Self {
            storage,
            soft_limit,
            ttl,
        }
    }

    /// Append one framed packet. Returns the queue length afterwards.
    pub async fn enqueue(&self, session_id: Uuid, packet: Vec<u8>) -> Result<usize, AppError> {
        let key = keys::outbox(session_id);
        let depth = self.storage.list_push(&key, packet).await?;
        self.storage.expire(&key, self.ttl).await?;

        histogram!(OUTBOX_DEPTH).record(depth as f64);
        if depth > self.soft_limit {
            counter!(OUTBOX_OVER_LIMIT).increment(1);
            warn!(
                session_id = %session_id,
                depth,
                soft_limit = self.soft_limit,
                "outbox past soft limit, client may have stalled"
            );
        }

        Ok(depth)
    }

    /// Enqueue the same packet for several sessions.
    pub async fn enqueue_many<'a, I>(&self, session_ids: I, packet: &[u8]) -> Result<(), AppError>
    where
        I: IntoIterator<Item = &'a Uuid>,
    {
        for session_id in session_ids {
            self.enqueue(*session_id, packet.to_vec()).await?;
        }
        Ok(())
    }

    /// Take every queued packet in enqueue order.
    pub async fn dequeue_all(&self, session_id: Uuid) -> Result<Vec<Vec<u8>>, AppError> {
        self.storage.list_drain(&keys::outbox(session_id)).await
    }

    pub async fn len(&self, session_id: Uuid) -> Result<usize, AppError> {
        self.storage.list_len(&keys::outbox(session_id)).await
    }

    pub async fn delete(&self, session_id: Uuid) -> Result<(), AppError> {
        self.storage.delete(&keys::outbox(session_id)).await?;
        Ok(())
    }
}
