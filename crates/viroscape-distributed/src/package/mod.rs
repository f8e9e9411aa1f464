//! The agent package: the only record that crosses rank boundaries.
//!
//! A package carries the identity, the shared vitals, every behaviour-affecting
//! field of its kind and the agent's pending neighbour mutation. Rebuilding an
//! agent from its package must reproduce it exactly, including the fractional
//! remainders, so that replicas never drift from their owners.
//!
//! - [`provider`] builds packages from live agents.
//! - [`receiver`] builds or updates live agents from packages.

pub mod provider;
pub mod receiver;

pub use provider::{provide, provide_many, AgentSource};
pub use receiver::{apply, create, update, AgentSink};

use serde::{Deserialize, Serialize};
use viroscape_core::{
    AgentId, AgentKind, ExternalState, ImmuneState, InternalState, MutationKind,
    NeighborMutation, RankId, SimError, SimResult, VirionState,
};

/// Flat wire record for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPackage {
    pub id: i32,
    pub starting_rank: i32,
    /// Kind discriminator, `0..=3`.
    pub kind: i32,
    pub current_rank: i32,
    pub lifespan: u32,
    pub age: u32,
    pub fields: KindFields,
    pub mutation: Option<MutationFields>,
}

impl AgentPackage {
    pub fn agent_kind(&self) -> SimResult<AgentKind> {
        AgentKind::try_from(self.kind)
    }

    /// Identity of the packaged agent, rejecting unknown kinds.
    pub fn agent_id(&self) -> SimResult<AgentId> {
        Ok(AgentId {
            seq: self.id,
            starting_rank: RankId::new(self.starting_rank),
            kind: self.agent_kind()?,
            current_rank: RankId::new(self.current_rank),
        })
    }
}

/// The fields specific to each kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KindFields {
    Epithelial {
        internal: InternalState,
        external: ExternalState,
        time_infected: u32,
        infected_lifespan: u32,
        time_since_division: u32,
        division_rate: u32,
        release_delay: u32,
        display_delay: u32,
        extracellular_release_probability: f64,
        cell_to_cell_probability: f64,
        virion_release_rate: f64,
        virions_to_release: u32,
        release_remainder: f64,
    },
    Virion {
        state: VirionState,
        penetration_probability: f64,
        clearance_probability: f64,
        clearance_scaler: f64,
    },
    Innate {
        state: ImmuneState,
        recognition_probability: f64,
        elimination_probability: f64,
        specialised_recruit_probability: f64,
        specialised_recruit_rate: f64,
        specialised_to_recruit: u32,
        specialised_remainder: f64,
        innate_recruit_rate: f64,
        innate_to_recruit: u32,
        innate_remainder: f64,
    },
    Specialised {
        state: ImmuneState,
        recognition_probability: f64,
        elimination_probability: f64,
        recruit_rate: f64,
        to_recruit: u32,
        recruit_remainder: f64,
    },
}

impl KindFields {
    pub fn kind(&self) -> AgentKind {
        match self {
            KindFields::Epithelial { .. } => AgentKind::Epithelial,
            KindFields::Virion { .. } => AgentKind::Virion,
            KindFields::Innate { .. } => AgentKind::Innate,
            KindFields::Specialised { .. } => AgentKind::Specialised,
        }
    }
}

/// A pending neighbour mutation, with the target identity spelled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationFields {
    pub kind: MutationKind,
    pub target_id: i32,
    pub target_starting_rank: i32,
    pub target_kind: i32,
    pub target_current_rank: i32,
}

impl From<&NeighborMutation> for MutationFields {
    fn from(mutation: &NeighborMutation) -> Self {
        Self {
            kind: mutation.kind,
            target_id: mutation.target.seq,
            target_starting_rank: mutation.target.starting_rank.as_i32(),
            target_kind: mutation.target.kind.discriminant(),
            target_current_rank: mutation.target.current_rank.as_i32(),
        }
    }
}

impl TryFrom<&MutationFields> for NeighborMutation {
    type Error = SimError;

    fn try_from(fields: &MutationFields) -> Result<Self, Self::Error> {
        Ok(NeighborMutation {
            kind: fields.kind,
            target: AgentId {
                seq: fields.target_id,
                starting_rank: RankId::new(fields.target_starting_rank),
                kind: AgentKind::try_from(fields.target_kind)?,
                current_rank: RankId::new(fields.target_current_rank),
            },
        })
    }
}
