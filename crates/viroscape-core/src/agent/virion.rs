//! Free virus particles.

use super::{random_neighbour, CellContact, Neighborhood, StepOutcome, Vitals};
use crate::rng::SimRng;
use crate::types::*;

#[derive(Debug, Clone, PartialEq)]
pub struct Virion {
    pub id: AgentId,
    pub vitals: Vitals,
    pub state: VirionState,
    pub penetration_probability: f64,
    pub clearance_probability: f64,
    pub clearance_scaler: f64,
}

impl Virion {
    pub fn new(
        id: AgentId,
        vitals: Vitals,
        penetration_probability: f64,
        clearance_probability: f64,
        clearance_scaler: f64,
    ) -> Self {
        Self {
            id,
            vitals,
            state: VirionState::Free,
            penetration_probability,
            clearance_probability,
            clearance_scaler,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == VirionState::Free
    }

    pub fn step(&mut self, here: GridPoint, grid: &dyn Neighborhood, rng: &mut SimRng) -> StepOutcome {
        let mut outcome = StepOutcome::default();

        if self.vitals.advance() && self.state != VirionState::Dead {
            self.state = VirionState::Dead;
        }
        if !self.is_free() {
            return outcome;
        }

        let here_now = grid.moore(here, 0, true);
        let cell = here_now.iter().find(|o| o.kind() == AgentKind::Epithelial);
        let immune = here_now.iter().filter(|o| o.kind().is_immune()).count();

        self.attempt_clearance(immune, rng);

        if self.is_free() {
            if let Some(cell) = cell.filter(|c| c.external == Some(ExternalState::SeeminglyHealthy)) {
                if rng.trial(self.penetration_probability) {
                    self.state = VirionState::Contained;
                    outcome.contact = Some(CellContact::Infect(cell.id));
                }
            }
        }

        if self.is_free() {
            outcome.relocation = Some(random_neighbour(here, rng));
        }
        outcome
    }

    /// Each co-located immune cell scales the draw once. The scaled draw is
    /// capped at 1 so a zero clearance probability never clears.
    fn attempt_clearance(&mut self, immune_cells: usize, rng: &mut SimRng) {
        let mut u = rng.uniform();
        for _ in 0..immune_cells {
            u *= self.clearance_scaler;
        }
        if u.min(1.0) > 1.0 - self.clearance_probability {
            self.state = VirionState::Dead;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::*;

    fn virion(clearance: f64, scaler: f64, penetration: f64) -> Virion {
        Virion::new(
            AgentId::new(0, RankId::new(0), AgentKind::Virion),
            Vitals::new(0, 1_000),
            penetration,
            clearance,
            scaler,
        )
    }

    #[test]
    fn test_zero_clearance_never_clears() {
        let mut grid = FakeGrid::default();
        for seq in 0..6 {
            grid.mobile(origin(), seq, AgentKind::Innate);
            grid.mobile(origin(), 10 + seq, AgentKind::Specialised);
        }
        let mut rng = SimRng::seeded(8);
        for _ in 0..500 {
            let mut v = virion(0.0, 50.0, 0.0);
            v.step(origin(), &grid, &mut rng);
            assert_eq!(v.state, VirionState::Free);
        }
    }

    #[test]
    fn test_certain_clearance() {
        let grid = FakeGrid::default();
        let mut v = virion(1.0, 1.0, 1.0);
        let outcome = v.step(origin(), &grid, &mut SimRng::seeded(8));
        assert_eq!(v.state, VirionState::Dead);
        assert_eq!(outcome, StepOutcome::default());
    }

    #[test]
    fn test_immune_presence_raises_clearance() {
        let mut crowded = FakeGrid::default();
        for seq in 0..3 {
            crowded.mobile(origin(), seq, AgentKind::Innate);
        }
        let empty = FakeGrid::default();

        let cleared = |grid: &FakeGrid| {
            let mut rng = SimRng::seeded(21);
            (0..2_000)
                .filter(|_| {
                    let mut v = virion(0.2, 2.0, 0.0);
                    v.step(origin(), grid, &mut rng);
                    v.state == VirionState::Dead
                })
                .count()
        };
        assert!(cleared(&crowded) > cleared(&empty));
    }

    #[test]
    fn test_infects_seemingly_healthy_cell() {
        let mut grid = FakeGrid::default();
        let cell = grid.epithelial(origin(), 5, ExternalState::SeeminglyHealthy);
        let mut v = virion(0.0, 1.0, 1.0);
        let outcome = v.step(origin(), &grid, &mut SimRng::seeded(2));
        assert_eq!(v.state, VirionState::Contained);
        assert_eq!(outcome.contact, Some(CellContact::Infect(cell)));
        assert_eq!(outcome.relocation, None);
    }

    #[test]
    fn test_ignores_displaying_cell_and_moves() {
        let mut grid = FakeGrid::default();
        grid.epithelial(origin(), 5, ExternalState::DisplayingViralProtein);
        let mut v = virion(0.0, 1.0, 1.0);
        let outcome = v.step(origin(), &grid, &mut SimRng::seeded(2));
        assert_eq!(v.state, VirionState::Free);
        assert_eq!(outcome.contact, None);
        let to = outcome.relocation.unwrap();
        assert!(is_moore_neighbour(origin(), to));
    }

    #[test]
    fn test_dies_of_age_without_acting() {
        let mut grid = FakeGrid::default();
        grid.epithelial(origin(), 5, ExternalState::SeeminglyHealthy);
        let mut v = virion(0.0, 1.0, 1.0);
        v.vitals = Vitals::new(3, 3);
        let outcome = v.step(origin(), &grid, &mut SimRng::seeded(2));
        assert_eq!(v.state, VirionState::Dead);
        assert_eq!(outcome, StepOutcome::default());
    }

    #[test]
    fn test_contained_virion_is_inert() {
        let grid = FakeGrid::default();
        let mut v = virion(0.0, 1.0, 1.0);
        v.state = VirionState::Contained;
        let outcome = v.step(origin(), &grid, &mut SimRng::seeded(2));
        assert_eq!(v.state, VirionState::Contained);
        assert_eq!(outcome, StepOutcome::default());
    }
}
