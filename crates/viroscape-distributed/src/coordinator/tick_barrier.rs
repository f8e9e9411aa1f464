//! Tick barrier for phase synchronization.
//!
//! Every rank signals when it has finished a phase. No rank may start the
//! next phase until all ranks have signalled, because the next phase reads
//! messages the others produced.

use crate::types::*;
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, Notify};
use tokio::time::Duration;
use viroscape_core::{RankId, Tick};

/// Barrier ensuring all ranks complete a phase before any proceeds.
pub struct TickBarrier {
    /// Ranks expected to participate.
    ranks: HashSet<RankId>,
    /// Ranks that have completed each (phase, tick).
    completed: Mutex<HashMap<(TickPhase, Tick), HashSet<RankId>>>,
    notify: Notify,
    timeout: Duration,
}

impl TickBarrier {
    pub fn new(ranks: impl IntoIterator<Item = RankId>, timeout: Duration) -> Self {
        Self {
            ranks: ranks.into_iter().collect(),
            completed: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            timeout,
        }
    }

    pub fn rank_count(&self) -> usize {
        self.ranks.len()
    }

    /// Mark a rank as having completed a phase.
    ///
    /// # Errors
    ///
    /// Returns `DistributedError::RankNotFound` for a rank outside the barrier.
    pub async fn complete(&self, rank: RankId, phase: TickPhase, tick: Tick) -> DistributedResult<()> {
        if !self.ranks.contains(&rank) {
            return Err(DistributedError::RankNotFound(rank));
        }
        self.completed
            .lock()
            .await
            .entry((phase, tick))
            .or_default()
            .insert(rank);
        self.notify.notify_waiters();
        Ok(())
    }

    pub async fn is_complete(&self, rank: RankId, phase: TickPhase, tick: Tick) -> bool {
        self.completed
            .lock()
            .await
            .get(&(phase, tick))
            .map_or(false, |done| done.contains(&rank))
    }

    pub async fn completed_count(&self, phase: TickPhase, tick: Tick) -> usize {
        self.completed
            .lock()
            .await
            .get(&(phase, tick))
            .map_or(0, HashSet::len)
    }

    /// Ranks that have not yet completed a phase, in rank order.
    pub async fn pending_ranks(&self, phase: TickPhase, tick: Tick) -> Vec<RankId> {
        let completed = self.completed.lock().await;
        let done = completed.get(&(phase, tick));
        let mut pending: Vec<RankId> = self
            .ranks
            .iter()
            .filter(|r| done.map_or(true, |d| !d.contains(r)))
            .copied()
            .collect();
        pending.sort();
        pending
    }

    /// Wait for all ranks to complete a phase.
    ///
    /// # Errors
    ///
    /// Returns `DistributedError::PhaseTimeout` if the timeout is reached
    /// before all ranks complete, and `DistributedError::BarrierFailed` for
    /// a barrier with no ranks.
    pub async fn wait_all(&self, phase: TickPhase, tick: Tick) -> DistributedResult<()> {
        if self.ranks.is_empty() {
            return Err(DistributedError::BarrierFailed);
        }

        let wait = async {
            loop {
                // Register for notification before checking, so a completion
                // between the check and the await is not missed.
                let notified = self.notify.notified();
                if self.completed_count(phase, tick).await >= self.ranks.len() {
                    return;
                }
                notified.await;
            }
        };

        tokio::time::timeout(self.timeout, wait)
            .await
            .map_err(|_| DistributedError::PhaseTimeout(phase))
    }

    /// Forget completion records of earlier ticks.
    pub async fn reset_for_tick(&self, tick: Tick) {
        self.completed.lock().await.retain(|(_, t), _| *t >= tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ranks(n: i32) -> Vec<RankId> {
        (0..n).map(RankId::new).collect()
    }

    #[tokio::test]
    async fn test_completion_tracking() {
        let barrier = TickBarrier::new(ranks(3), Duration::from_secs(1));
        barrier.complete(RankId::new(2), TickPhase::Act, 0).await.unwrap();
        barrier.complete(RankId::new(2), TickPhase::Act, 0).await.unwrap();

        assert!(barrier.is_complete(RankId::new(2), TickPhase::Act, 0).await);
        assert!(!barrier.is_complete(RankId::new(2), TickPhase::Rebalance, 0).await);
        assert_eq!(barrier.completed_count(TickPhase::Act, 0).await, 1);
        assert_eq!(
            barrier.pending_ranks(TickPhase::Act, 0).await,
            vec![RankId::new(0), RankId::new(1)]
        );
    }

    #[tokio::test]
    async fn test_unknown_rank_rejected() {
        let barrier = TickBarrier::new(ranks(2), Duration::from_secs(1));
        let result = barrier.complete(RankId::new(7), TickPhase::Act, 0).await;
        assert!(matches!(result, Err(DistributedError::RankNotFound(_))));
    }

    #[tokio::test]
    async fn test_wait_releases_when_all_complete() {
        let barrier = Arc::new(TickBarrier::new(ranks(2), Duration::from_secs(5)));
        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait_all(TickPhase::SyncStates, 3).await })
        };
        for rank in ranks(2) {
            barrier.complete(rank, TickPhase::SyncStates, 3).await.unwrap();
        }
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let barrier = TickBarrier::new(ranks(2), Duration::from_millis(20));
        barrier.complete(RankId::new(0), TickPhase::Act, 0).await.unwrap();
        let result = barrier.wait_all(TickPhase::Act, 0).await;
        assert!(matches!(result, Err(DistributedError::PhaseTimeout(TickPhase::Act))));
    }

    #[tokio::test]
    async fn test_empty_barrier_fails() {
        let barrier = TickBarrier::new(Vec::new(), Duration::from_millis(20));
        assert!(matches!(
            barrier.wait_all(TickPhase::Act, 0).await,
            Err(DistributedError::BarrierFailed)
        ));
    }

    #[tokio::test]
    async fn test_reset_keeps_current_tick() {
        let barrier = TickBarrier::new(ranks(1), Duration::from_secs(1));
        barrier.complete(RankId::new(0), TickPhase::Act, 0).await.unwrap();
        barrier.complete(RankId::new(0), TickPhase::Act, 1).await.unwrap();
        barrier.reset_for_tick(1).await;
        assert_eq!(barrier.completed_count(TickPhase::Act, 0).await, 0);
        assert_eq!(barrier.completed_count(TickPhase::Act, 1).await, 1);
    }
}
