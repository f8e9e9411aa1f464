//! # Viroscape Distributed
//!
//! Runs the simulation on a grid split across ranks. Each rank owns the
//! agents in its partition and mirrors the agents near its border into its
//! neighbours as read-only replicas. Every tick runs the local agents, then
//! moves agents that crossed a border and refreshes the replicas, with a
//! barrier between phases.

pub mod coordinator;
pub mod package;
pub mod partition;
pub mod rank;
pub mod runner;
pub mod transport;
pub mod types;
pub mod wire;

pub use coordinator::{Coordinator, TickBarrier};
pub use package::{AgentPackage, KindFields, MutationFields};
pub use partition::{GridGeometry, Partition};
pub use rank::{ActReport, AgentStore, RankProcess};
pub use runner::{DistributedRunner, RunnerConfig};
pub use transport::{InProcessTransport, Transport};
pub use types::*;
pub use wire::{Envelope, ExportEntry, SyncMessage};
