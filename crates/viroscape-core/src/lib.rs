//! # Viroscape Core
//!
//! Agent kinds, their state machines and the stochastic sub-models that
//! drive a spatial simulation of viral infection and immune response.
//!
//! Agents never mutate one another directly. A step either changes the
//! agent's own state, publishes a [`NeighborMutation`] request, or returns a
//! [`StepOutcome`] that the owning rank applies. This keeps buffer-zone
//! replicas read-only outside of synchronization.

pub mod agent;
pub mod census;
pub mod error;
pub mod params;
pub mod rng;
pub mod spawn;
pub mod types;

pub use agent::{
    Agent, CellContact, EpithelialCell, InnateImmuneCell, Neighborhood, Occupant,
    SpecialisedImmuneCell, StepOutcome, Virion, Vitals,
};
pub use census::Census;
pub use error::{SimError, SimResult};
pub use params::{NormalParam, SimulationParameters, BUFFER_WIDTH};
pub use rng::SimRng;
pub use spawn::{AgentFactory, Origin, RateCarry};
pub use types::*;
