//! The act phase: reconciliation, local steps and their side effects.
//!
//! Each local agent's step, together with everything applied right after
//! it, forms one unit. A failing unit is logged and counted; the remaining
//! agents still act.

use super::RankProcess;
use tracing::{debug, trace, warn};
use viroscape_core::{
    Agent, AgentId, AgentKind, CellContact, GridPoint, InternalState, MutationKind, Origin,
    SimError, SimResult,
};

/// Counts from one act phase on one rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActReport {
    pub stepped: usize,
    pub spawned: usize,
    pub removed: usize,
    pub mutations_applied: usize,
    pub isolated_failures: usize,
}

impl RankProcess {
    /// Run the act phase.
    ///
    /// Replica epithelial cells get their pending mutations reconciled first,
    /// then every local agent steps once in a seeded shuffled order. Agents
    /// spawned during the phase first step next tick.
    pub fn act(&mut self) -> ActReport {
        let mut report = ActReport::default();

        for source in self.store.replica_ids(Some(AgentKind::Epithelial)) {
            match self.reconcile(&source) {
                Ok(true) => report.mutations_applied += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(rank = %self.rank, agent = %source, error = %e, "replica reconciliation failed");
                    report.isolated_failures += 1;
                }
            }
        }

        let mut order = self.store.local_ids(None);
        self.rng.shuffle(&mut order);
        for id in order {
            if let Err(e) = self.act_on(&id, &mut report) {
                warn!(rank = %self.rank, agent = %id, error = %e, "agent unit failed");
                report.isolated_failures += 1;
            }
        }

        self.summary.stepped += report.stepped;
        self.summary.spawned += report.spawned;
        self.summary.removed += report.removed;
        self.summary.mutations_applied += report.mutations_applied;
        self.summary.isolated_failures += report.isolated_failures;

        debug!(
            rank = %self.rank,
            stepped = report.stepped,
            spawned = report.spawned,
            removed = report.removed,
            mutations = report.mutations_applied,
            "act phase complete"
        );
        report
    }

    fn act_on(&mut self, id: &AgentId, report: &mut ActReport) -> SimResult<()> {
        let here = self
            .store
            .location(id)
            .ok_or_else(|| SimError::Grid(format!("{} is not on the grid", id)))?;
        let Some(mut agent) = self.store.take_local(id) else {
            return Ok(());
        };
        let outcome = agent.step(here, &self.store, &mut self.rng);
        self.store.restore_local(agent);
        report.stepped += 1;

        if let Some(contact) = outcome.contact {
            self.apply_contact(contact)?;
        }
        if let Some(to) = outcome.relocation {
            self.store.move_to(id, to);
        }

        match id.kind {
            AgentKind::Epithelial => {
                if self.reconcile(id)? {
                    report.mutations_applied += 1;
                }
                self.release_virions(id, report)?;
            }
            AgentKind::Virion => {}
            AgentKind::Innate | AgentKind::Specialised => self.spawn_recruits(id, report)?,
        }

        if id.kind != AgentKind::Epithelial {
            self.remove_if_dead(id, report)?;
        }
        Ok(())
    }

    /// Apply the pending mutation of epithelial cell `source` if its target
    /// lives on this rank and still satisfies the guard.
    ///
    /// Returns whether the mutation was applied. A failed guard is a lost
    /// race, not an error.
    pub fn reconcile(&mut self, source: &AgentId) -> SimResult<bool> {
        let (mutation, source_infected) = match self.store.get(source) {
            Some(Agent::Epithelial(cell)) => match cell.pending {
                Some(mutation) => (mutation, cell.internal == InternalState::Infected),
                None => return Ok(false),
            },
            Some(other) => {
                return Err(SimError::consistency(*source, "epithelial", other.kind().to_string()))
            }
            None => return Err(SimError::AgentNotFound(*source)),
        };

        let target_id = mutation.target;
        if target_id.current_rank != self.rank {
            return Ok(false);
        }

        let held_as_replica = self.store.is_replica(&target_id);
        let target = match self.store.get_local_mut(&target_id) {
            Some(Agent::Epithelial(cell)) => cell,
            Some(other) => {
                return Err(SimError::consistency(target_id, "epithelial", other.kind().to_string()))
            }
            None => {
                return Err(SimError::consistency(
                    target_id,
                    format!("owned by {}", self.rank),
                    if held_as_replica { "replica" } else { "missing" },
                ))
            }
        };

        match mutation.kind {
            MutationKind::DivideInto => {
                if target.internal != InternalState::Dead {
                    trace!(source = %source, target = %target_id, "division target no longer dead");
                    return Ok(false);
                }
                self.factory.revive(target, &mut self.rng);
            }
            MutationKind::Infect => {
                if !source_infected || target.internal != InternalState::Healthy {
                    trace!(source = %source, target = %target_id, "infection target no longer healthy");
                    return Ok(false);
                }
                target.infect();
            }
        }
        Ok(true)
    }

    /// Apply a contact to the epithelial cell the acting agent stood on.
    fn apply_contact(&mut self, contact: CellContact) -> SimResult<()> {
        let target = match contact {
            CellContact::Infect(t) | CellContact::Eliminate(t) => t,
        };
        let held_as_replica = self.store.is_replica(&target);
        match self.store.get_local_mut(&target) {
            Some(Agent::Epithelial(cell)) => {
                match contact {
                    CellContact::Infect(_) => cell.infect(),
                    CellContact::Eliminate(_) => cell.eliminate(),
                }
                Ok(())
            }
            Some(other) => Err(SimError::consistency(target, "epithelial", other.kind().to_string())),
            None => Err(SimError::consistency(
                target,
                format!("owned by {}", self.rank),
                if held_as_replica { "replica" } else { "missing" },
            )),
        }
    }

    fn release_virions(&mut self, id: &AgentId, report: &mut ActReport) -> SimResult<()> {
        let (count, point) = match (self.store.get_local(id), self.store.location(id)) {
            (Some(Agent::Epithelial(cell)), Some(point)) => (cell.release.pending, point),
            _ => return Ok(()),
        };
        for _ in 0..count {
            let virion = self.factory.virion(&mut self.rng, Origin::Spawned);
            self.spawn_at(Agent::Virion(virion), point, report)?;
        }
        Ok(())
    }

    fn spawn_recruits(&mut self, id: &AgentId, report: &mut ActReport) -> SimResult<()> {
        let (innate, specialised) = match self.store.get_local(id) {
            Some(Agent::Innate(cell)) => (cell.innate_recruit.pending, cell.specialised_recruit.pending),
            Some(Agent::Specialised(cell)) => (0, cell.recruit.pending),
            _ => (0, 0),
        };
        for _ in 0..innate {
            self.spawn_innate(report)?;
        }
        for _ in 0..specialised {
            let cell = self.factory.specialised(&mut self.rng, Origin::Spawned);
            let point = self.partition.random_point_in(self.rank, &mut self.rng)?;
            self.spawn_at(Agent::Specialised(cell), point, report)?;
        }
        Ok(())
    }

    fn spawn_innate(&mut self, report: &mut ActReport) -> SimResult<()> {
        let cell = self.factory.innate(&mut self.rng, Origin::Spawned);
        let point = self.partition.random_point_in(self.rank, &mut self.rng)?;
        self.spawn_at(Agent::Innate(cell), point, report)
    }

    fn spawn_at(&mut self, agent: Agent, point: GridPoint, report: &mut ActReport) -> SimResult<()> {
        self.store.add_local(agent, point)?;
        report.spawned += 1;
        Ok(())
    }

    /// Remove a dead non-epithelial agent. A dying innate cell is replaced
    /// first, until the local innate population exceeds this rank's initial
    /// share. The dying cell still counts towards that population.
    fn remove_if_dead(&mut self, id: &AgentId, report: &mut ActReport) -> SimResult<()> {
        let removable = self.store.get_local(id).map_or(false, Agent::is_removable);
        if !removable {
            return Ok(());
        }
        if id.kind == AgentKind::Innate {
            // `<=` because the dying cell is still counted here.
            while self.store.count_local(Some(AgentKind::Innate), |_| true) <= self.initial_innate {
                self.spawn_innate(report)?;
            }
        }
        self.store.remove_local(id);
        report.removed += 1;
        Ok(())
    }
}
