//! Delivery of envelopes between ranks.

use crate::types::{DistributedError, DistributedResult};
use crate::wire::Envelope;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use viroscape_core::RankId;

/// Moves envelopes from senders to recipients.
///
/// A sync round posts every outgoing envelope, waits at the barrier, then
/// each rank drains its inbox. Drained envelopes come back ordered by sender
/// rank, keeping message handling independent of scheduling.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, envelopes: Vec<Envelope>) -> DistributedResult<()>;

    async fn drain(&self, rank: RankId) -> DistributedResult<Vec<Envelope>>;
}

/// Mailboxes in shared memory, for ranks running in one process.
pub struct InProcessTransport {
    inboxes: Mutex<HashMap<RankId, Vec<Envelope>>>,
}

impl InProcessTransport {
    pub fn new(ranks: impl IntoIterator<Item = RankId>) -> Self {
        Self {
            inboxes: Mutex::new(ranks.into_iter().map(|r| (r, Vec::new())).collect()),
        }
    }

    /// Envelopes waiting for `rank`.
    pub async fn pending(&self, rank: RankId) -> usize {
        self.inboxes.lock().await.get(&rank).map_or(0, Vec::len)
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn post(&self, envelopes: Vec<Envelope>) -> DistributedResult<()> {
        let mut inboxes = self.inboxes.lock().await;
        for envelope in envelopes {
            inboxes
                .get_mut(&envelope.to)
                .ok_or(DistributedError::RankNotFound(envelope.to))?
                .push(envelope);
        }
        Ok(())
    }

    async fn drain(&self, rank: RankId) -> DistributedResult<Vec<Envelope>> {
        let mut inboxes = self.inboxes.lock().await;
        let inbox = inboxes
            .get_mut(&rank)
            .ok_or(DistributedError::RankNotFound(rank))?;
        let mut envelopes = std::mem::take(inbox);
        envelopes.sort_by_key(|e| e.from);
        Ok(envelopes)
    }
}
