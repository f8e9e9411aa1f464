//! Agent creation and fractional-rate accumulation.
//!
//! [`AgentFactory`] draws every stochastic parameter for new agents from the
//! configured distributions and hands out per-kind sequence numbers on one
//! rank. [`RateCarry`] turns a real-valued rate into whole counts per event
//! without losing the fractional part between events.

use crate::agent::{EpithelialCell, InnateImmuneCell, SpecialisedImmuneCell, Virion, Vitals};
use crate::params::{NormalParam, SimulationParameters};
use crate::rng::SimRng;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Redraw limit for a truncated normal before falling back to the floor.
const MAX_REDRAWS: usize = 1_000;

/// A real-valued rate with its fractional carry.
///
/// `remainder` persists for the agent's whole life. `pending` is the count
/// produced by the current step and is cleared at the start of every step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateCarry {
    pub rate: f64,
    pub pending: u32,
    pub remainder: f64,
}

impl RateCarry {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            pending: 0,
            remainder: 0.0,
        }
    }

    /// Add one event's worth of the rate; the whole part becomes `pending`.
    pub fn accrue(&mut self) -> u32 {
        let total = self.rate + self.remainder;
        let whole = total.floor();
        self.pending = whole as u32;
        self.remainder = total - whole;
        self.pending
    }

    pub fn clear_pending(&mut self) {
        self.pending = 0;
    }
}

/// Whether an agent is part of the starting population or spawned later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Starting population: age drawn uniformly within the lifespan.
    Initial,
    /// Released or recruited during the run: age starts at zero.
    Spawned,
}

/// Builds agents for one rank.
#[derive(Debug, Clone)]
pub struct AgentFactory {
    rank: RankId,
    params: SimulationParameters,
    next_seq: [i32; 4],
}

impl AgentFactory {
    pub fn new(rank: RankId, params: SimulationParameters) -> Self {
        Self {
            rank,
            params,
            next_seq: [0; 4],
        }
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    /// Number of identities issued so far for `kind`.
    pub fn issued(&self, kind: AgentKind) -> i32 {
        self.next_seq[kind.discriminant() as usize]
    }

    fn next_id(&mut self, kind: AgentKind) -> AgentId {
        let slot = &mut self.next_seq[kind.discriminant() as usize];
        let id = AgentId::new(*slot, self.rank, kind);
        *slot += 1;
        id
    }

    pub fn epithelial(&mut self, rng: &mut SimRng) -> EpithelialCell {
        let id = self.next_id(AgentKind::Epithelial);
        let mut cell = self.fresh_epithelial(id, rng);
        cell.vitals.age = rng.uniform_int(0, cell.vitals.lifespan as i64) as u32;
        cell.time_since_division = rng.uniform_int(0, cell.division_rate as i64 - 1) as u32;
        cell
    }

    /// Reinitialise a dead cell in place after a neighbour divided into it.
    ///
    /// Identity and location are kept; every other field is redrawn as for a
    /// newborn cell.
    pub fn revive(&self, cell: &mut EpithelialCell, rng: &mut SimRng) {
        *cell = self.fresh_epithelial(cell.id, rng);
    }

    fn fresh_epithelial(&self, id: AgentId, rng: &mut SimRng) -> EpithelialCell {
        let p = &self.params.epithelial;
        let lifespan = draw_duration(rng, p.lifespan);
        let infected_lifespan = draw_duration(rng, p.infected_lifespan);
        let division_rate = draw_duration(rng, p.division_rate);
        let display_delay = draw_duration(rng, p.display_delay);
        let release_delay = draw_release_delay(rng, p.release_delay, display_delay);
        let release_rate = draw_at_least(rng, p.virion_release_rate, 0.1);

        let mut cell = EpithelialCell::healthy(id, Vitals::new(0, lifespan));
        cell.infected_lifespan = infected_lifespan;
        cell.division_rate = division_rate;
        cell.display_delay = display_delay;
        cell.release_delay = release_delay;
        cell.extracellular_release_probability = p.extracellular_release_probability;
        cell.cell_to_cell_probability = p.cell_to_cell_probability;
        cell.release = RateCarry::new(release_rate);
        cell
    }

    pub fn virion(&mut self, rng: &mut SimRng, origin: Origin) -> Virion {
        let id = self.next_id(AgentKind::Virion);
        let p = &self.params.virion;
        let lifespan = draw_duration(rng, p.lifespan);
        let vitals = initial_vitals(rng, lifespan, origin);
        Virion::new(
            id,
            vitals,
            p.penetration_probability,
            p.clearance_probability,
            p.clearance_scaler,
        )
    }

    pub fn innate(&mut self, rng: &mut SimRng, origin: Origin) -> InnateImmuneCell {
        let id = self.next_id(AgentKind::Innate);
        let p = &self.params.innate;
        let lifespan = draw_duration(rng, p.lifespan);
        let vitals = initial_vitals(rng, lifespan, origin);
        InnateImmuneCell::new(
            id,
            vitals,
            p.recognition_probability,
            p.elimination_probability,
            p.specialised_recruit_probability,
            p.specialised_recruit_rate,
            p.innate_recruit_rate,
        )
    }

    pub fn specialised(&mut self, rng: &mut SimRng, origin: Origin) -> SpecialisedImmuneCell {
        let id = self.next_id(AgentKind::Specialised);
        let p = &self.params.specialised;
        let lifespan = draw_duration(rng, p.lifespan);
        let vitals = initial_vitals(rng, lifespan, origin);
        SpecialisedImmuneCell::new(
            id,
            vitals,
            p.recognition_probability,
            p.elimination_probability,
            p.recruit_rate,
        )
    }
}

fn initial_vitals(rng: &mut SimRng, lifespan: u32, origin: Origin) -> Vitals {
    let age = match origin {
        Origin::Initial => rng.uniform_int(0, lifespan as i64) as u32,
        Origin::Spawned => 0,
    };
    Vitals::new(age, lifespan)
}

fn draw_at_least(rng: &mut SimRng, param: NormalParam, floor: f64) -> f64 {
    for _ in 0..MAX_REDRAWS {
        let value = rng.normal(param.mean, param.std_dev);
        if value >= floor {
            return value;
        }
    }
    floor
}

/// Whole steps, at least one.
fn draw_duration(rng: &mut SimRng, param: NormalParam) -> u32 {
    draw_at_least(rng, param, 1.0) as u32
}

fn draw_release_delay(rng: &mut SimRng, param: NormalParam, display_delay: u32) -> u32 {
    for _ in 0..MAX_REDRAWS {
        let value = rng.normal(param.mean, param.std_dev);
        if !(value < 1.0 && value <= display_delay as f64) {
            return value.max(0.0) as u32;
        }
    }
    display_delay
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> AgentFactory {
        AgentFactory::new(RankId::new(1), SimulationParameters::default())
    }

    #[test]
    fn test_carry_scenario() {
        let mut carry = RateCarry::new(1.5);
        assert_eq!(carry.accrue(), 1);
        assert_eq!(carry.remainder, 0.5);
        assert_eq!(carry.accrue(), 2);
        assert_eq!(carry.remainder, 0.0);
    }

    #[test]
    fn test_carry_tracks_real_accumulation() {
        for rate in [0.3, 0.7, 1.1, 2.45, 3.0] {
            let mut carry = RateCarry::new(rate);
            let mut released: u64 = 0;
            for n in 1..=500u64 {
                released += carry.accrue() as u64;
                let exact = (n as f64 * rate + 1e-9).floor() as i64;
                assert!((released as i64 - exact).abs() <= 1, "rate {} tick {}", rate, n);
                assert!(carry.remainder >= 0.0 && carry.remainder < 1.0);
            }
        }
    }

    #[test]
    fn test_clear_pending_keeps_remainder() {
        let mut carry = RateCarry::new(0.75);
        carry.accrue();
        carry.clear_pending();
        assert_eq!(carry.pending, 0);
        assert_eq!(carry.remainder, 0.75);
    }

    #[test]
    fn test_ids_per_kind() {
        let mut f = factory();
        let mut rng = SimRng::seeded(1);
        let a = f.virion(&mut rng, Origin::Initial);
        let b = f.virion(&mut rng, Origin::Spawned);
        let c = f.innate(&mut rng, Origin::Initial);
        assert_eq!(a.id.seq, 0);
        assert_eq!(b.id.seq, 1);
        assert_eq!(c.id.seq, 0);
        assert_eq!(a.id.starting_rank, RankId::new(1));
        assert_eq!(f.issued(AgentKind::Virion), 2);
        assert_eq!(f.issued(AgentKind::Specialised), 0);
    }

    #[test]
    fn test_spawned_agents_start_young() {
        let mut f = factory();
        let mut rng = SimRng::seeded(2);
        for _ in 0..20 {
            assert_eq!(f.virion(&mut rng, Origin::Spawned).vitals.age, 0);
            assert_eq!(f.innate(&mut rng, Origin::Spawned).vitals.age, 0);
            assert_eq!(f.specialised(&mut rng, Origin::Spawned).vitals.age, 0);
        }
    }

    #[test]
    fn test_initial_ages_within_lifespan() {
        let mut f = factory();
        let mut rng = SimRng::seeded(3);
        for _ in 0..50 {
            let s = f.specialised(&mut rng, Origin::Initial);
            assert!(s.vitals.age <= s.vitals.lifespan);
            let e = f.epithelial(&mut rng);
            assert!(e.vitals.age <= e.vitals.lifespan);
            assert!(e.time_since_division <= e.division_rate);
        }
    }

    #[test]
    fn test_drawn_parameters_respect_floors() {
        let mut params = SimulationParameters::default();
        params.epithelial.lifespan = NormalParam::new(1.0, 5.0);
        params.epithelial.virion_release_rate = NormalParam::new(0.1, 1.0);
        let mut f = AgentFactory::new(RankId::new(0), params);
        let mut rng = SimRng::seeded(4);
        for _ in 0..200 {
            let cell = f.epithelial(&mut rng);
            assert!(cell.vitals.lifespan >= 1);
            assert!(cell.division_rate >= 1);
            assert!(cell.release_delay >= 1);
            assert!(cell.release.rate >= 0.1);
            assert_eq!(cell.internal, InternalState::Healthy);
            assert_eq!(cell.pending, None);
        }
    }

    #[test]
    fn test_revive_resets_to_newborn() {
        let f = factory();
        let mut rng = SimRng::seeded(5);
        let id = AgentId::new(9, RankId::new(1), AgentKind::Epithelial).on_rank(RankId::new(1));
        let mut cell = EpithelialCell::healthy(id, Vitals::new(77, 80));
        cell.infect();
        cell.time_infected = 12;
        cell.time_since_division = 4;
        cell.release = RateCarry { rate: 2.0, pending: 3, remainder: 0.4 };
        cell.die();

        f.revive(&mut cell, &mut rng);
        assert_eq!(cell.id, id);
        assert_eq!(cell.internal, InternalState::Healthy);
        assert_eq!(cell.external, ExternalState::SeeminglyHealthy);
        assert_eq!(cell.time_infected, 0);
        assert_eq!(cell.time_since_division, 0);
        assert_eq!(cell.vitals.age, 0);
        assert_eq!(cell.release.pending, 0);
        assert_eq!(cell.release.remainder, 0.0);
        assert_eq!(cell.pending, None);
    }

    #[test]
    fn test_zero_deviation_is_deterministic() {
        let mut params = SimulationParameters::default();
        params.virion.lifespan = NormalParam::new(12.0, 0.0);
        let mut f = AgentFactory::new(RankId::new(0), params);
        let v = f.virion(&mut SimRng::seeded(6), Origin::Spawned);
        assert_eq!(v.vitals.lifespan, 12);
    }
}
