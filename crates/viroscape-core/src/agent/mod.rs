//! Agent kinds and the step contract they share.
//!
//! Each kind is a plain struct; [`Agent`] is the closed union over them and
//! every dispatch site matches it exhaustively.
//!
//! A step reads its surroundings through [`Neighborhood`], which returns
//! [`Occupant`] snapshots rather than references. An agent therefore cannot
//! touch another agent during its own step. Effects on others travel as
//! either a pending [`NeighborMutation`](crate::types::NeighborMutation)
//! (epithelial cells) or a [`CellContact`] in the returned [`StepOutcome`]
//! (virions and immune cells acting on the cell they stand on).

mod epithelial;
mod innate;
mod specialised;
mod virion;

pub use epithelial::EpithelialCell;
pub use innate::InnateImmuneCell;
pub use specialised::SpecialisedImmuneCell;
pub use virion::Virion;

use crate::rng::SimRng;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Spatial read access available to a stepping agent.
pub trait Neighborhood {
    /// Agents within Chebyshev distance `radius` of `center`, with wraparound.
    ///
    /// `include_center = false` leaves out agents on `center` itself.
    fn moore(&self, center: GridPoint, radius: i32, include_center: bool) -> Vec<Occupant>;
}

/// What a stepping agent can see of another agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occupant {
    pub id: AgentId,
    /// Perceivable state, for epithelial cells only.
    pub external: Option<ExternalState>,
}

impl Occupant {
    pub fn kind(&self) -> AgentKind {
        self.id.kind
    }

    fn is_epithelial_showing(&self, state: ExternalState) -> bool {
        self.kind() == AgentKind::Epithelial && self.external == Some(state)
    }
}

/// An effect on the epithelial cell the acting agent stands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellContact {
    /// A virion penetrated the cell.
    Infect(AgentId),
    /// An immune cell killed the cell.
    Eliminate(AgentId),
}

/// Side effects of one step that the owning rank must apply.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepOutcome {
    pub contact: Option<CellContact>,
    /// Requested new location, not yet wrapped onto the grid.
    pub relocation: Option<GridPoint>,
}

/// Age and lifespan, common to every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitals {
    pub age: u32,
    pub lifespan: u32,
}

impl Vitals {
    pub fn new(age: u32, lifespan: u32) -> Self {
        Self { age, lifespan }
    }

    /// Age by one step. Returns true once the lifespan is exceeded.
    pub fn advance(&mut self) -> bool {
        self.age = self.age.saturating_add(1);
        self.age > self.lifespan
    }
}

fn random_neighbour(here: GridPoint, rng: &mut SimRng) -> GridPoint {
    let index = rng.uniform_int(0, MOORE_OFFSETS.len() as i64 - 1) as usize;
    here.offset(MOORE_OFFSETS[index])
}

/// Any agent of the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum Agent {
    Epithelial(EpithelialCell),
    Virion(Virion),
    Innate(InnateImmuneCell),
    Specialised(SpecialisedImmuneCell),
}

impl Agent {
    pub fn id(&self) -> AgentId {
        match self {
            Agent::Epithelial(a) => a.id,
            Agent::Virion(a) => a.id,
            Agent::Innate(a) => a.id,
            Agent::Specialised(a) => a.id,
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.id().kind
    }

    /// Record the rank that now owns this agent.
    pub fn set_current_rank(&mut self, rank: RankId) {
        match self {
            Agent::Epithelial(a) => a.id.current_rank = rank,
            Agent::Virion(a) => a.id.current_rank = rank,
            Agent::Innate(a) => a.id.current_rank = rank,
            Agent::Specialised(a) => a.id.current_rank = rank,
        }
    }

    pub fn vitals(&self) -> Vitals {
        match self {
            Agent::Epithelial(a) => a.vitals,
            Agent::Virion(a) => a.vitals,
            Agent::Innate(a) => a.vitals,
            Agent::Specialised(a) => a.vitals,
        }
    }

    /// Whether the agent must leave the simulation. Epithelial cells never do;
    /// their death is undone by division.
    pub fn is_removable(&self) -> bool {
        match self {
            Agent::Epithelial(_) => false,
            Agent::Virion(v) => v.state != VirionState::Free,
            Agent::Innate(c) => c.state == ImmuneState::Dead,
            Agent::Specialised(c) => c.state == ImmuneState::Dead,
        }
    }

    pub fn external_state(&self) -> Option<ExternalState> {
        match self {
            Agent::Epithelial(cell) => Some(cell.external),
            _ => None,
        }
    }

    pub fn occupant(&self) -> Occupant {
        Occupant {
            id: self.id(),
            external: self.external_state(),
        }
    }

    pub fn as_epithelial(&self) -> Option<&EpithelialCell> {
        match self {
            Agent::Epithelial(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_epithelial_mut(&mut self) -> Option<&mut EpithelialCell> {
        match self {
            Agent::Epithelial(cell) => Some(cell),
            _ => None,
        }
    }

    /// Run one step of this agent's state machine at `here`.
    pub fn step(
        &mut self,
        here: GridPoint,
        grid: &dyn Neighborhood,
        rng: &mut SimRng,
    ) -> StepOutcome {
        match self {
            Agent::Epithelial(cell) => {
                cell.step(here, grid, rng);
                StepOutcome::default()
            }
            Agent::Virion(virion) => virion.step(here, grid, rng),
            Agent::Innate(cell) => cell.step(here, grid, rng),
            Agent::Specialised(cell) => cell.step(here, grid, rng),
        }
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the per-kind tests.

    use super::*;
    use std::collections::HashMap;

    /// A hand-built neighbourhood on an unbounded grid.
    #[derive(Default)]
    pub struct FakeGrid {
        cells: HashMap<GridPoint, Vec<Occupant>>,
    }

    impl FakeGrid {
        pub fn put(&mut self, at: GridPoint, id: AgentId, external: Option<ExternalState>) {
            self.cells.entry(at).or_default().push(Occupant { id, external });
        }

        pub fn epithelial(&mut self, at: GridPoint, seq: i32, state: ExternalState) -> AgentId {
            let id = AgentId::new(seq, RankId::new(0), AgentKind::Epithelial);
            self.put(at, id, Some(state));
            id
        }

        pub fn mobile(&mut self, at: GridPoint, seq: i32, kind: AgentKind) -> AgentId {
            let id = AgentId::new(seq, RankId::new(0), kind);
            self.put(at, id, None);
            id
        }
    }

    impl Neighborhood for FakeGrid {
        fn moore(&self, center: GridPoint, radius: i32, include_center: bool) -> Vec<Occupant> {
            let mut found = Vec::new();
            for dx in -radius..=radius {
                for dy in -radius..=radius {
                    if !include_center && dx == 0 && dy == 0 {
                        continue;
                    }
                    if let Some(list) = self.cells.get(&center.offset((dx, dy))) {
                        found.extend(list.iter().copied());
                    }
                }
            }
            found
        }
    }

    pub fn origin() -> GridPoint {
        GridPoint::new(0, 0)
    }

    pub fn is_moore_neighbour(from: GridPoint, to: GridPoint) -> bool {
        let dx = (to.x - from.x).abs();
        let dy = (to.y - from.y).abs();
        dx <= 1 && dy <= 1 && (dx, dy) != (0, 0)
    }
}
