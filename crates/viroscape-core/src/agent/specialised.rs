//! Specialised immune cells: the adaptive response, recruited by innate
//! cells and by each other.

use super::{random_neighbour, CellContact, Neighborhood, StepOutcome, Vitals};
use crate::rng::SimRng;
use crate::spawn::RateCarry;
use crate::types::*;

#[derive(Debug, Clone, PartialEq)]
pub struct SpecialisedImmuneCell {
    pub id: AgentId,
    pub vitals: Vitals,
    pub state: ImmuneState,
    pub recognition_probability: f64,
    pub elimination_probability: f64,
    pub recruit: RateCarry,
}

impl SpecialisedImmuneCell {
    pub fn new(
        id: AgentId,
        vitals: Vitals,
        recognition_probability: f64,
        elimination_probability: f64,
        recruit_rate: f64,
    ) -> Self {
        Self {
            id,
            vitals,
            state: ImmuneState::Healthy,
            recognition_probability,
            elimination_probability,
            recruit: RateCarry::new(recruit_rate),
        }
    }

    pub fn step(&mut self, here: GridPoint, grid: &dyn Neighborhood, rng: &mut SimRng) -> StepOutcome {
        self.recruit.clear_pending();

        if self.vitals.advance() && self.state != ImmuneState::Dead {
            self.state = ImmuneState::Dead;
        }
        if self.state == ImmuneState::Dead {
            return StepOutcome::default();
        }

        StepOutcome {
            contact: self.detect(here, grid, rng),
            relocation: Some(random_neighbour(here, rng)),
        }
    }

    fn detect(&mut self, here: GridPoint, grid: &dyn Neighborhood, rng: &mut SimRng) -> Option<CellContact> {
        // Only the first epithelial cell at this location counts.
        let cell = grid
            .moore(here, 0, true)
            .into_iter()
            .find(|o| o.kind() == AgentKind::Epithelial)?;

        if cell.external != Some(ExternalState::DisplayingViralProtein) {
            return None;
        }
        if !rng.trial(self.recognition_probability) {
            return None;
        }

        self.recruit.accrue();
        if rng.trial(self.elimination_probability) {
            Some(CellContact::Eliminate(cell.id))
        } else {
            None
        }
    }
}
