//! Epithelial cells: the fixed tissue the virus infects.

use super::{Neighborhood, Occupant, Vitals};
use crate::rng::SimRng;
use crate::spawn::RateCarry;
use crate::types::*;

#[derive(Debug, Clone, PartialEq)]
pub struct EpithelialCell {
    pub id: AgentId,
    pub vitals: Vitals,
    pub internal: InternalState,
    pub external: ExternalState,
    pub time_infected: u32,
    pub infected_lifespan: u32,
    pub time_since_division: u32,
    pub division_rate: u32,
    /// Steps after infection before progeny virions are released.
    pub release_delay: u32,
    /// Steps after infection before viral protein is displayed.
    pub display_delay: u32,
    pub extracellular_release_probability: f64,
    pub cell_to_cell_probability: f64,
    /// Virions to release; `pending` is this step's count.
    pub release: RateCarry,
    /// Cleared at the start of every step, set at most once per step.
    pub pending: Option<NeighborMutation>,
}

impl EpithelialCell {
    /// A healthy cell with inert parameters. Callers fill in the rest.
    pub fn healthy(id: AgentId, vitals: Vitals) -> Self {
        Self {
            id,
            vitals,
            internal: InternalState::Healthy,
            external: ExternalState::SeeminglyHealthy,
            time_infected: 0,
            infected_lifespan: 1,
            time_since_division: 0,
            division_rate: 1,
            release_delay: 1,
            display_delay: 1,
            extracellular_release_probability: 0.0,
            cell_to_cell_probability: 0.0,
            release: RateCarry::new(0.0),
            pending: None,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.internal == InternalState::Dead
    }

    pub fn infect(&mut self) {
        self.internal = InternalState::Infected;
    }

    pub fn eliminate(&mut self) {
        self.die();
    }

    pub fn die(&mut self) {
        self.internal = InternalState::Dead;
        self.external = ExternalState::DeadCell;
    }

    /// One step of the cell's state machine.
    pub fn step(&mut self, here: GridPoint, grid: &dyn Neighborhood, rng: &mut SimRng) {
        self.pending = None;
        self.release.clear_pending();

        if self.vitals.advance() && !self.is_dead() {
            self.die();
        }

        match self.internal {
            InternalState::Infected => self.act_infected(here, grid, rng),
            InternalState::Healthy => self.act_healthy(here, grid, rng),
            InternalState::Dead => {}
        }
    }

    fn act_infected(&mut self, here: GridPoint, grid: &dyn Neighborhood, rng: &mut SimRng) {
        self.time_infected = self.time_infected.saturating_add(1);
        if self.time_infected > self.infected_lifespan {
            self.die();
            return;
        }

        if self.time_infected > self.display_delay {
            self.external = ExternalState::DisplayingViralProtein;
        }

        if self.time_infected > self.release_delay {
            // A cell can be configured to release before it displays.
            self.external = ExternalState::DisplayingViralProtein;
            self.release_progeny(rng);
            self.spread_to_neighbour(here, grid, rng);
        }
    }

    fn act_healthy(&mut self, here: GridPoint, grid: &dyn Neighborhood, rng: &mut SimRng) {
        self.time_since_division = self.time_since_division.saturating_add(1);
        if self.time_since_division <= self.division_rate {
            return;
        }

        let dead = neighbours_showing(here, grid, ExternalState::DeadCell);
        if let Some(target) = rng.choose(&dead) {
            self.pending = Some(NeighborMutation::divide_into(target.id));
        }
        self.time_since_division = 0;
    }

    fn release_progeny(&mut self, rng: &mut SimRng) {
        if rng.trial(self.extracellular_release_probability) {
            self.release.accrue();
        }
    }

    fn spread_to_neighbour(&mut self, here: GridPoint, grid: &dyn Neighborhood, rng: &mut SimRng) {
        if !rng.trial(self.cell_to_cell_probability) {
            return;
        }
        let candidates = neighbours_showing(here, grid, ExternalState::SeeminglyHealthy);
        if let Some(target) = rng.choose(&candidates) {
            self.pending = Some(NeighborMutation::infect(target.id));
        }
    }
}

fn neighbours_showing(here: GridPoint, grid: &dyn Neighborhood, state: ExternalState) -> Vec<Occupant> {
    grid.moore(here, 1, false)
        .into_iter()
        .filter(|o| o.is_epithelial_showing(state))
        .collect()
}
