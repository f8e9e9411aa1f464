//! Innate immune cells: first responders that patrol, kill displaying cells
//! and call for reinforcements.

use super::{random_neighbour, CellContact, Neighborhood, StepOutcome, Vitals};
use crate::rng::SimRng;
use crate::spawn::RateCarry;
use crate::types::*;

#[derive(Debug, Clone, PartialEq)]
pub struct InnateImmuneCell {
    pub id: AgentId,
    pub vitals: Vitals,
    pub state: ImmuneState,
    pub recognition_probability: f64,
    pub elimination_probability: f64,
    pub specialised_recruit_probability: f64,
    pub specialised_recruit: RateCarry,
    pub innate_recruit: RateCarry,
}

impl InnateImmuneCell {
    pub fn new(
        id: AgentId,
        vitals: Vitals,
        recognition_probability: f64,
        elimination_probability: f64,
        specialised_recruit_probability: f64,
        specialised_recruit_rate: f64,
        innate_recruit_rate: f64,
    ) -> Self {
        Self {
            id,
            vitals,
            state: ImmuneState::Healthy,
            recognition_probability,
            elimination_probability,
            specialised_recruit_probability,
            specialised_recruit: RateCarry::new(specialised_recruit_rate),
            innate_recruit: RateCarry::new(innate_recruit_rate),
        }
    }

    pub fn step(&mut self, here: GridPoint, grid: &dyn Neighborhood, rng: &mut SimRng) -> StepOutcome {
        self.innate_recruit.clear_pending();
        self.specialised_recruit.clear_pending();

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
        let here_now = grid.moore(here, 0, true);
        let cell = here_now.iter().find(|o| o.kind() == AgentKind::Epithelial)?;
        let specialised_here = here_now
            .iter()
            .filter(|o| o.kind() == AgentKind::Specialised)
            .count();

        if cell.external != Some(ExternalState::DisplayingViralProtein) {
            return None;
        }
        if !rng.trial(self.recognition_probability) {
            return None;
        }

        // More innate cells only while no specialised cell has arrived here.
        if specialised_here == 0 {
            self.innate_recruit.accrue();
        }
        if rng.trial(self.specialised_recruit_probability) {
            self.specialised_recruit.accrue();
        }

        if rng.trial(self.elimination_probability) {
            Some(CellContact::Eliminate(cell.id))
        } else {
            None
        }
    }
}
