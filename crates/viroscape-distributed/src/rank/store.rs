//! Per-rank agent store with a spatial index.
//!
//! Owned agents and replicas live in separate maps, keyed by logical
//! identity. Both share one point index so that neighbour queries see the
//! whole buffer zone.

use crate::package::{AgentSink, AgentSource};
use crate::partition::GridGeometry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;
use viroscape_core::{
    Agent, AgentId, AgentKind, Census, GridPoint, Neighborhood, Occupant, RankId, SimError,
    SimResult,
};

pub struct AgentStore {
    rank: RankId,
    geometry: GridGeometry,
    local: BTreeMap<AgentId, Agent>,
    replicas: BTreeMap<AgentId, Agent>,
    locations: HashMap<AgentId, GridPoint>,
    cells: HashMap<GridPoint, BTreeSet<AgentId>>,
}

impl AgentStore {
    pub fn new(rank: RankId, geometry: GridGeometry) -> Self {
        Self {
            rank,
            geometry,
            local: BTreeMap::new(),
            replicas: BTreeMap::new(),
            locations: HashMap::new(),
            cells: HashMap::new(),
        }
    }

    pub fn rank(&self) -> RankId {
        self.rank
    }

    fn index(&mut self, id: AgentId, point: GridPoint) {
        let point = self.geometry.wrap(point);
        if let Some(previous) = self.locations.insert(id, point) {
            self.unindex_point(&id, previous);
        }
        self.cells.entry(point).or_default().insert(id);
    }

    fn unindex_point(&mut self, id: &AgentId, point: GridPoint) {
        if let Some(ids) = self.cells.get_mut(&point) {
            ids.remove(id);
            if ids.is_empty() {
                self.cells.remove(&point);
            }
        }
    }

    fn unindex(&mut self, id: &AgentId) {
        if let Some(point) = self.locations.remove(id) {
            self.unindex_point(id, point);
        }
    }

    /// Add an owned agent at `point`.
    pub fn add_local(&mut self, agent: Agent, point: GridPoint) -> SimResult<()> {
        let id = agent.id();
        self.adopt(agent)?;
        self.index(id, point);
        Ok(())
    }

    /// Take ownership of an agent whose location is not yet known.
    pub fn adopt(&mut self, agent: Agent) -> SimResult<()> {
        let id = agent.id();
        if self.local.contains_key(&id) {
            return Err(SimError::consistency(id, "a new local agent", "already local"));
        }
        if self.replicas.contains_key(&id) {
            return Err(SimError::consistency(id, "a new local agent", "held as replica"));
        }
        self.local.insert(id, agent);
        Ok(())
    }

    /// Put an adopted agent on the grid.
    pub fn place(&mut self, id: &AgentId, point: GridPoint) -> SimResult<()> {
        let key = match self.local.get(id) {
            Some(agent) => agent.id(),
            None => return Err(SimError::AgentNotFound(*id)),
        };
        self.index(key, point);
        Ok(())
    }

    /// Insert or replace a replica.
    pub fn add_replica(&mut self, agent: Agent, point: GridPoint) -> SimResult<()> {
        let id = agent.id();
        if self.local.contains_key(&id) {
            return Err(SimError::consistency(id, "a remote agent", "owned locally"));
        }
        self.replicas.insert(id, agent);
        self.index(id, point);
        Ok(())
    }

    pub fn remove_local(&mut self, id: &AgentId) -> Option<Agent> {
        let agent = self.local.remove(id)?;
        self.unindex(id);
        Some(agent)
    }

    pub fn remove_replica(&mut self, id: &AgentId) -> Option<Agent> {
        let agent = self.replicas.remove(id)?;
        self.unindex(id);
        Some(agent)
    }

    /// Lift an owned agent out for its step. It keeps its place in the index
    /// but is invisible to queries until [`AgentStore::restore_local`].
    pub fn take_local(&mut self, id: &AgentId) -> Option<Agent> {
        self.local.remove(id)
    }

    pub fn restore_local(&mut self, agent: Agent) {
        self.local.insert(agent.id(), agent);
    }

    /// An owned agent, falling back to a replica.
    pub fn get(&self, id: &AgentId) -> Option<&Agent> {
        self.local.get(id).or_else(|| self.replicas.get(id))
    }

    pub fn get_local(&self, id: &AgentId) -> Option<&Agent> {
        self.local.get(id)
    }

    pub fn get_local_mut(&mut self, id: &AgentId) -> Option<&mut Agent> {
        self.local.get_mut(id)
    }

    pub fn get_replica(&self, id: &AgentId) -> Option<&Agent> {
        self.replicas.get(id)
    }

    pub fn is_local(&self, id: &AgentId) -> bool {
        self.local.contains_key(id)
    }

    pub fn is_replica(&self, id: &AgentId) -> bool {
        self.replicas.contains_key(id)
    }

    pub fn location(&self, id: &AgentId) -> Option<GridPoint> {
        self.locations.get(id).copied()
    }

    /// Move an owned agent, wrapping `point` onto the grid.
    ///
    /// Moving an id this rank does not own is logged and ignored.
    pub fn move_to(&mut self, id: &AgentId, point: GridPoint) -> Option<GridPoint> {
        if !self.local.contains_key(id) || !self.locations.contains_key(id) {
            warn!(rank = %self.rank, agent = %id, "move of an agent this rank does not hold on the grid");
            return None;
        }
        self.index(*id, point);
        self.location(id)
    }

    /// Move a replica to where its owner reports it.
    pub fn relocate_replica(&mut self, id: &AgentId, point: GridPoint) -> SimResult<()> {
        if !self.replicas.contains_key(id) {
            return Err(SimError::AgentNotFound(*id));
        }
        self.index(*id, point);
        Ok(())
    }

    /// Ids of owned agents, optionally of one kind, in id order.
    pub fn local_ids(&self, kind: Option<AgentKind>) -> Vec<AgentId> {
        select(&self.local, kind)
    }

    pub fn replica_ids(&self, kind: Option<AgentKind>) -> Vec<AgentId> {
        select(&self.replicas, kind)
    }

    /// Replicas whose owner is `owner`.
    pub fn replica_ids_owned_by(&self, owner: RankId) -> Vec<AgentId> {
        self.replicas
            .values()
            .map(Agent::id)
            .filter(|id| id.current_rank == owner)
            .collect()
    }

    pub fn local_agents(&self) -> impl Iterator<Item = &Agent> {
        self.local.values()
    }

    pub fn replicas(&self) -> impl Iterator<Item = &Agent> {
        self.replicas.values()
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    pub fn replica_len(&self) -> usize {
        self.replicas.len()
    }

    /// Owned agents of `kind` (or of any kind) matching `predicate`.
    pub fn count_local<P>(&self, kind: Option<AgentKind>, predicate: P) -> usize
    where
        P: Fn(&Agent) -> bool,
    {
        self.local
            .values()
            .filter(|a| kind.map_or(true, |k| a.kind() == k))
            .filter(|a| predicate(*a))
            .count()
    }

    pub fn census(&self) -> Census {
        Census::from_agents(self.local.values())
    }
}

fn select(agents: &BTreeMap<AgentId, Agent>, kind: Option<AgentKind>) -> Vec<AgentId> {
    agents
        .values()
        .filter(|a| kind.map_or(true, |k| a.kind() == k))
        .map(Agent::id)
        .collect()
}

impl Neighborhood for AgentStore {
    fn moore(&self, center: GridPoint, radius: i32, include_center: bool) -> Vec<Occupant> {
        let mut found = Vec::new();
        for point in self.geometry.window(center, radius, include_center) {
            let Some(ids) = self.cells.get(&point) else {
                continue;
            };
            found.extend(ids.iter().filter_map(|id| self.get(id)).map(Agent::occupant));
        }
        found
    }
}

impl AgentSource for AgentStore {
    fn owned(&self, id: &AgentId) -> Option<&Agent> {
        self.local.get(id)
    }
}

impl AgentSink for AgentStore {
    fn resolve_mut(&mut self, id: &AgentId) -> Option<&mut Agent> {
        if self.local.contains_key(id) {
            return self.local.get_mut(id);
        }
        self.replicas.get_mut(id)
    }
}
