//! Rebalance and the three sync rounds.
//!
//! Each round is split into a producing half that returns envelopes and a
//! consuming half that takes the rank's drained inbox. Any error here means
//! the ranks disagree about who owns or mirrors what, so it aborts the tick.

use super::RankProcess;
use crate::package::{create, provide, provide_many, update};
use crate::types::{DistributedError, DistributedResult, TickPhase};
use crate::wire::{Envelope, ExportEntry, SyncMessage};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use viroscape_core::{AgentId, RankId, SimError};

fn unexpected(envelope: &Envelope, phase: TickPhase, message: &SyncMessage) -> DistributedError {
    DistributedError::UnexpectedMessage {
        from: envelope.from,
        phase,
        message: message.name().to_string(),
    }
}

impl RankProcess {
    /// Hand every local agent standing outside this rank's partition to the
    /// owner of its point.
    pub fn rebalance(&mut self) -> DistributedResult<Vec<Envelope>> {
        let mut outgoing: BTreeMap<RankId, Vec<_>> = BTreeMap::new();

        for id in self.store.local_ids(None) {
            let Some(point) = self.store.location(&id) else {
                continue;
            };
            let owner = self.partition.owner_of(point);
            if owner == self.rank {
                continue;
            }
            let Some(mut agent) = self.store.remove_local(&id) else {
                continue;
            };
            agent.set_current_rank(owner);
            outgoing.entry(owner).or_default().push((provide(&agent), point));
        }

        let transferred: usize = outgoing.values().map(Vec::len).sum();
        self.summary.transferred_out += transferred;
        if transferred > 0 {
            debug!(rank = %self.rank, transferred, "agents left the partition");
        }

        outgoing
            .into_iter()
            .map(|(to, agents)| Envelope::seal(self.rank, to, &SyncMessage::Transfer { agents }))
            .collect()
    }

    /// Take ownership of transferred agents. They are placed during the
    /// projection round.
    pub fn sync_status(&mut self, inbox: Vec<Envelope>) -> DistributedResult<usize> {
        let mut received = 0;
        for envelope in inbox {
            let agents = match envelope.open()? {
                SyncMessage::Transfer { agents } => agents,
                other => return Err(unexpected(&envelope, TickPhase::SyncStatus, &other)),
            };
            for (package, point) in agents {
                let mut agent = create(&package)?;
                agent.set_current_rank(self.rank);
                let id = agent.id();
                self.store.remove_replica(&id);
                self.store.adopt(agent)?;
                self.arrivals.push((id, point));
                received += 1;
            }
        }
        if received > 0 {
            debug!(rank = %self.rank, received, "agents adopted");
        }
        Ok(received)
    }

    /// Place this tick's arrivals and tell every neighbour which local
    /// agents it must mirror. Agents a neighbour did not mirror before are
    /// sent in full; the rest only report their location.
    pub fn publish_projection(&mut self) -> DistributedResult<Vec<Envelope>> {
        for (id, point) in std::mem::take(&mut self.arrivals) {
            self.store.place(&id, point)?;
        }

        let mut next: BTreeMap<RankId, BTreeSet<AgentId>> =
            self.neighbours.iter().map(|n| (*n, BTreeSet::new())).collect();
        for id in self.store.local_ids(None) {
            let point = self.store.location(&id).ok_or(SimError::AgentNotFound(id))?;
            for recipient in self.partition.buffer_recipients(self.rank, point) {
                next.entry(recipient).or_default().insert(id);
            }
        }

        let mut envelopes = Vec::with_capacity(next.len());
        for (neighbour, ids) in &next {
            let previous = self.exports.get(neighbour);
            let mut entries = Vec::with_capacity(ids.len());
            for id in ids {
                let agent = self.store.get_local(id).ok_or(SimError::AgentNotFound(*id))?;
                let point = self.store.location(id).ok_or(SimError::AgentNotFound(*id))?;
                let known = previous.map_or(false, |p| p.contains(id));
                entries.push(ExportEntry {
                    id: agent.id(),
                    point,
                    package: (!known).then(|| provide(agent)),
                });
            }
            envelopes.push(Envelope::seal(
                self.rank,
                *neighbour,
                &SyncMessage::BufferExport { entries },
            )?);
        }

        self.exports = next;
        Ok(envelopes)
    }

    /// Bring the replica set in line with what each neighbour exported.
    pub fn sync_projection(&mut self, inbox: Vec<Envelope>) -> DistributedResult<()> {
        let (mut created, mut dropped) = (0usize, 0usize);
        for envelope in inbox {
            let entries = match envelope.open()? {
                SyncMessage::BufferExport { entries } => entries,
                other => return Err(unexpected(&envelope, TickPhase::SyncProjection, &other)),
            };

            let listed: BTreeSet<AgentId> = entries.iter().map(|e| e.id).collect();
            for stale in self.store.replica_ids_owned_by(envelope.from) {
                if !listed.contains(&stale) {
                    self.store.remove_replica(&stale);
                    dropped += 1;
                }
            }

            for entry in entries {
                if self.store.is_local(&entry.id) {
                    return Err(SimError::consistency(
                        entry.id,
                        format!("owned by {}", envelope.from),
                        format!("owned by {}", self.rank),
                    )
                    .into());
                }
                match entry.package {
                    Some(package) => {
                        let agent = create(&package)?;
                        self.store.add_replica(agent, entry.point)?;
                        created += 1;
                    }
                    None => self.store.relocate_replica(&entry.id, entry.point)?,
                }
            }
        }
        debug!(rank = %self.rank, created, dropped, replicas = self.store.replica_len(), "projection synced");
        Ok(())
    }

    /// Ask each owner for the current state of the replicas held here.
    pub fn request_states(&self) -> DistributedResult<Vec<Envelope>> {
        let mut by_owner: BTreeMap<RankId, Vec<AgentId>> = BTreeMap::new();
        for id in self.store.replica_ids(None) {
            by_owner.entry(id.current_rank).or_default().push(id);
        }
        by_owner
            .into_iter()
            .map(|(owner, ids)| Envelope::seal(self.rank, owner, &SyncMessage::StateRequest { ids }))
            .collect()
    }

    /// Answer state requests with packages of the owned agents.
    pub fn answer_state_requests(&self, inbox: Vec<Envelope>) -> DistributedResult<Vec<Envelope>> {
        let mut replies = Vec::with_capacity(inbox.len());
        for envelope in inbox {
            let ids = match envelope.open()? {
                SyncMessage::StateRequest { ids } => ids,
                other => return Err(unexpected(&envelope, TickPhase::SyncStates, &other)),
            };
            let packages = provide_many(&self.store, &ids)?;
            replies.push(Envelope::seal(
                self.rank,
                envelope.from,
                &SyncMessage::StateReply { packages },
            )?);
        }
        Ok(replies)
    }

    /// Overwrite replicas with their owners' state.
    pub fn sync_states(&mut self, inbox: Vec<Envelope>) -> DistributedResult<usize> {
        let mut refreshed = 0;
        for envelope in inbox {
            let packages = match envelope.open()? {
                SyncMessage::StateReply { packages } => packages,
                other => return Err(unexpected(&envelope, TickPhase::SyncStates, &other)),
            };
            for package in &packages {
                update(&mut self.store, package)?;
                refreshed += 1;
            }
        }
        self.summary.refreshed += refreshed;
        debug!(rank = %self.rank, refreshed, "replica states synced");
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Partition;
    use std::sync::Arc;
    use viroscape_core::*;

    fn pair() -> (RankProcess, RankProcess) {
        let mut params = SimulationParameters::default();
        params.grid.dimension = 8;
        params.grid.processes_x = 2;
        params.grid.processes_y = 1;
        params.population.virions = 0;
        params.population.innate = 0;
        params.population.specialised = 0;
        let partition = Arc::new(Partition::from_params(&params.grid).unwrap());
        let a = RankProcess::new(RankId::new(0), partition.clone(), params.clone()).unwrap();
        let b = RankProcess::new(RankId::new(1), partition, params).unwrap();
        (a, b)
    }

    fn deliver(envelopes: Vec<Envelope>, to: RankId) -> Vec<Envelope> {
        envelopes.into_iter().filter(|e| e.to == to).collect()
    }

    fn project(a: &mut RankProcess, b: &mut RankProcess) {
        let from_a = a.publish_projection().unwrap();
        let from_b = b.publish_projection().unwrap();
        a.sync_projection(deliver(from_b, a.rank())).unwrap();
        b.sync_projection(deliver(from_a, b.rank())).unwrap();
    }

    fn refresh(a: &mut RankProcess, b: &mut RankProcess) {
        let asks_b = deliver(a.request_states().unwrap(), b.rank());
        let asks_a = deliver(b.request_states().unwrap(), a.rank());
        let replies_to_a = b.answer_state_requests(asks_b).unwrap();
        let replies_to_b = a.answer_state_requests(asks_a).unwrap();
        a.sync_states(replies_to_a).unwrap();
        b.sync_states(replies_to_b).unwrap();
    }

    fn innate(seq: i32, owner: RankId) -> Agent {
        Agent::Innate(InnateImmuneCell::new(
            AgentId::new(seq, owner, AgentKind::Innate),
            Vitals::new(0, 50),
            0.5,
            0.5,
            0.1,
            0.3,
            0.7,
        ))
    }

    #[test]
    fn test_border_agent_is_mirrored_and_refreshed() {
        let (mut a, mut b) = pair();
        let agent = innate(0, a.rank());
        let id = agent.id();
        // rank 0 owns x in -4..0; x = -1 borders rank 1
        a.store_mut().add_local(agent, GridPoint::new(-1, 2)).unwrap();
        project(&mut a, &mut b);
        assert!(b.store().is_replica(&id));
        assert_eq!(b.store().location(&id), Some(GridPoint::new(-1, 2)));

        if let Some(Agent::Innate(cell)) = a.store_mut().get_local_mut(&id) {
            cell.vitals.age = 9;
            cell.innate_recruit.accrue();
        }
        a.store_mut().move_to(&id, GridPoint::new(-1, 3));
        project(&mut a, &mut b);
        assert_eq!(b.store().location(&id), Some(GridPoint::new(-1, 3)));
        refresh(&mut a, &mut b);
        assert_eq!(b.store().get_replica(&id), a.store().get_local(&id));
        assert_eq!(b.summary().refreshed, 1);
    }

    #[test]
    fn test_interior_agent_is_not_mirrored() {
        let (mut a, mut b) = pair();
        let agent = innate(0, a.rank());
        let id = agent.id();
        // x = -4 borders rank 1 across the wraparound
        a.store_mut().add_local(agent, GridPoint::new(-4, 0)).unwrap();
        project(&mut a, &mut b);
        assert!(b.store().is_replica(&id));

        a.store_mut().move_to(&id, GridPoint::new(-2, 0));
        project(&mut a, &mut b);
        assert!(!b.store().is_replica(&id));
        assert_eq!(b.store().replica_len(), 0);
    }

    #[test]
    fn test_transfer_moves_ownership() {
        let (mut a, mut b) = pair();
        let agent = innate(0, a.rank());
        let id = agent.id();
        a.store_mut().add_local(agent, GridPoint::new(-1, 0)).unwrap();
        project(&mut a, &mut b);
        assert!(b.store().is_replica(&id));

        a.store_mut().move_to(&id, GridPoint::new(0, 0));
        let out = a.rebalance().unwrap();
        assert_eq!(out.len(), 1);
        assert!(b.rebalance().unwrap().is_empty());
        assert!(!a.store().is_local(&id));

        assert_eq!(b.sync_status(out).unwrap(), 1);
        assert!(b.store().is_local(&id));
        assert!(!b.store().is_replica(&id));
        assert_eq!(b.store().get(&id).unwrap().id().current_rank, b.rank());

        project(&mut a, &mut b);
        assert_eq!(b.store().location(&id), Some(GridPoint::new(0, 0)));
        // the agent now borders rank 0 from the other side
        assert!(a.store().is_replica(&id));
        assert_eq!(a.store().get(&id).unwrap().id().current_rank, b.rank());
        assert_eq!(a.summary().transferred_out, 1);
    }

    #[test]
    fn test_wrong_message_in_round() {
        let (mut a, b) = pair();
        let stray = b.request_states().unwrap();
        assert!(stray.is_empty());
        let envelope = Envelope::seal(
            b.rank(),
            a.rank(),
            &SyncMessage::StateRequest { ids: Vec::new() },
        )
        .unwrap();
        let err = a.sync_status(vec![envelope]).unwrap_err();
        assert!(matches!(err, DistributedError::UnexpectedMessage { .. }));
    }

    #[test]
    fn test_state_request_for_unknown_agent_fails() {
        let (a, b) = pair();
        let ghost = AgentId::new(4, a.rank(), AgentKind::Virion);
        let ask = Envelope::seal(b.rank(), a.rank(), &SyncMessage::StateRequest { ids: vec![ghost] }).unwrap();
        let err = a.answer_state_requests(vec![ask]).unwrap_err();
        assert!(matches!(err, DistributedError::Sim(SimError::AgentNotFound(_))));
    }

    #[test]
    fn test_export_claiming_local_agent_is_violation() {
        let (mut a, b) = pair();
        let agent = innate(0, a.rank());
        let id = agent.id();
        a.store_mut().add_local(agent, GridPoint::new(-1, 0)).unwrap();
        let bogus = Envelope::seal(
            b.rank(),
            a.rank(),
            &SyncMessage::BufferExport {
                entries: vec![ExportEntry { id, point: GridPoint::new(-1, 0), package: None }],
            },
        )
        .unwrap();
        assert!(a.sync_projection(vec![bogus]).unwrap_err().is_consistency_violation());
    }
}
