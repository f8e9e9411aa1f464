//! Coordinator for the partitioned simulation.
//!
//! The coordinator holds the global tick counter, the partition every rank
//! agrees on, and the barrier that keeps the ranks in lockstep through the
//! phases of a tick.

mod tick_barrier;

pub use tick_barrier::TickBarrier;

use crate::partition::Partition;
use crate::types::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Duration;
use viroscape_core::{GridPoint, RankId, Tick};

/// Shared tick state for all ranks.
///
/// # Thread Safety
///
/// The tick counter is atomic and the barrier locks internally, so the
/// coordinator can be shared behind an `Arc` by every rank task.
pub struct Coordinator {
    partition: Arc<Partition>,
    current_tick: AtomicU64,
    barrier: TickBarrier,
}

impl Coordinator {
    pub fn new(partition: Arc<Partition>, phase_timeout: Duration) -> Self {
        let barrier = TickBarrier::new(partition.ranks(), phase_timeout);
        Self {
            partition,
            current_tick: AtomicU64::new(0),
            barrier,
        }
    }

    pub fn partition(&self) -> &Arc<Partition> {
        &self.partition
    }

    pub fn rank_count(&self) -> usize {
        self.partition.rank_count()
    }

    /// The rank that owns `point`.
    pub fn route(&self, point: GridPoint) -> RankId {
        self.partition.owner_of(point)
    }

    /// Signal that a rank has completed a phase.
    pub async fn phase_complete(&self, rank: RankId, phase: TickPhase, tick: Tick) -> DistributedResult<()> {
        self.barrier.complete(rank, phase, tick).await
    }

    /// Wait until every rank has completed a phase.
    pub async fn wait_for_phase(&self, phase: TickPhase, tick: Tick) -> DistributedResult<()> {
        self.barrier.wait_all(phase, tick).await
    }

    pub fn barrier(&self) -> &TickBarrier {
        &self.barrier
    }

    /// Advance to the next tick and return its number.
    pub async fn advance_tick(&self) -> Tick {
        let new_tick = self.current_tick.fetch_add(1, Ordering::SeqCst) + 1;
        self.barrier.reset_for_tick(new_tick).await;
        new_tick
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick.load(Ordering::SeqCst)
    }
}
