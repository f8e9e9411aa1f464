//! Population counts by kind and state.

use crate::agent::Agent;
use crate::types::{InternalState, VirionState};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Counts of agents, for one rank or summed across ranks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Census {
    pub healthy_cells: usize,
    pub infected_cells: usize,
    pub dead_cells: usize,
    pub free_virions: usize,
    pub innate_cells: usize,
    pub specialised_cells: usize,
    pub total_agents: usize,
}

impl Census {
    pub fn from_agents<'a>(agents: impl IntoIterator<Item = &'a Agent>) -> Self {
        let mut census = Census::default();
        for agent in agents {
            census.record(agent);
        }
        census
    }

    fn record(&mut self, agent: &Agent) {
        self.total_agents += 1;
        match agent {
            Agent::Epithelial(cell) => match cell.internal {
                InternalState::Healthy => self.healthy_cells += 1,
                InternalState::Infected => self.infected_cells += 1,
                InternalState::Dead => self.dead_cells += 1,
            },
            Agent::Virion(v) => {
                if v.state == VirionState::Free {
                    self.free_virions += 1;
                }
            }
            Agent::Innate(_) => self.innate_cells += 1,
            Agent::Specialised(_) => self.specialised_cells += 1,
        }
    }

    pub fn epithelial_cells(&self) -> usize {
        self.healthy_cells + self.infected_cells + self.dead_cells
    }

    /// Epithelial cells that are not dead, healthy or infected.
    pub fn alive_epithelial(&self) -> usize {
        self.healthy_cells + self.infected_cells
    }

    /// CSV header matching [`Census::csv_row`].
    pub fn csv_header() -> &'static str {
        "tick,healthy,infected,dead,virions,innate,specialised,total"
    }

    pub fn csv_row(&self, tick: u64) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            tick,
            self.healthy_cells,
            self.infected_cells,
            self.dead_cells,
            self.free_virions,
            self.innate_cells,
            self.specialised_cells,
            self.total_agents
        )
    }
}

impl Add for Census {
    type Output = Census;

    fn add(mut self, other: Census) -> Census {
        self += other;
        self
    }
}

impl AddAssign for Census {
    fn add_assign(&mut self, other: Census) {
        self.healthy_cells += other.healthy_cells;
        self.infected_cells += other.infected_cells;
        self.dead_cells += other.dead_cells;
        self.free_virions += other.free_virions;
        self.innate_cells += other.innate_cells;
        self.specialised_cells += other.specialised_cells;
        self.total_agents += other.total_agents;
    }
}

impl std::iter::Sum for Census {
    fn sum<I: Iterator<Item = Census>>(iter: I) -> Census {
        iter.fold(Census::default(), Add::add)
    }
}
