//! Core types for partitioned execution.
//!
//! This module defines the tick phases every rank moves through in lockstep,
//! the error type shared by the distributed layer, and the per-tick reports
//! the runner hands back to callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use viroscape_core::{Census, RankId, SimError, Tick};

/// Errors that can occur in distributed operations.
#[derive(Error, Debug, Clone)]
pub enum DistributedError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("Rank {0} not found")]
    RankNotFound(RankId),

    #[error("Wire error: {0}")]
    Wire(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected {message} from {from} during {phase}")]
    UnexpectedMessage {
        from: RankId,
        phase: TickPhase,
        message: String,
    },

    #[error("Timeout waiting for phase {0}")]
    PhaseTimeout(TickPhase),

    #[error("Barrier synchronization failed")]
    BarrierFailed,
}

impl DistributedError {
    /// Whether the ranks can no longer be trusted to agree.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, DistributedError::Sim(e) if e.is_consistency_violation())
    }
}

/// Result type for distributed operations.
pub type DistributedResult<T> = Result<T, DistributedError>;

/// Phases of a distributed tick.
///
/// Every rank finishes a phase before any rank starts the next. The three
/// sync phases together bring each rank's replicas back in line with their
/// owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickPhase {
    /// Reconcile, step, spawn and remove local agents.
    Act,
    /// Hand agents that left the partition to their new owner.
    Rebalance,
    /// Install the agents received during rebalance.
    SyncStatus,
    /// Refresh which agents each rank mirrors, and where they stand.
    SyncProjection,
    /// Overwrite every replica with its owner's current state.
    SyncStates,
}

impl TickPhase {
    pub const ALL: [TickPhase; 5] = [
        TickPhase::Act,
        TickPhase::Rebalance,
        TickPhase::SyncStatus,
        TickPhase::SyncProjection,
        TickPhase::SyncStates,
    ];
}

impl std::fmt::Display for TickPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickPhase::Act => write!(f, "Act"),
            TickPhase::Rebalance => write!(f, "Rebalance"),
            TickPhase::SyncStatus => write!(f, "SyncStatus"),
            TickPhase::SyncProjection => write!(f, "SyncProjection"),
            TickPhase::SyncStates => write!(f, "SyncStates"),
        }
    }
}

/// What one rank did during a tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankSummary {
    pub rank: RankId,
    /// Owned agents at the end of the tick.
    pub local_agents: usize,
    /// Replicas held at the end of the tick.
    pub replicas: usize,
    pub stepped: usize,
    pub spawned: usize,
    pub removed: usize,
    /// Neighbour mutations that passed their guard and were applied.
    pub mutations_applied: usize,
    /// Per-agent failures that were logged and skipped.
    pub isolated_failures: usize,
    /// Agents handed to another rank.
    pub transferred_out: usize,
    /// Replicas refreshed from their owners.
    pub refreshed: usize,
}

impl RankSummary {
    pub fn new(rank: RankId) -> Self {
        Self {
            rank,
            local_agents: 0,
            replicas: 0,
            stepped: 0,
            spawned: 0,
            removed: 0,
            mutations_applied: 0,
            isolated_failures: 0,
            transferred_out: 0,
            refreshed: 0,
        }
    }
}

/// Result of one completed tick across all ranks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: Tick,
    /// Population over all ranks, owned agents only.
    pub census: Census,
    pub ranks: Vec<RankSummary>,
}

impl TickReport {
    pub fn transferred(&self) -> usize {
        self.ranks.iter().map(|r| r.transferred_out).sum()
    }

    pub fn refreshed(&self) -> usize {
        self.ranks.iter().map(|r| r.refreshed).sum()
    }

    pub fn isolated_failures(&self) -> usize {
        self.ranks.iter().map(|r| r.isolated_failures).sum()
    }
}
