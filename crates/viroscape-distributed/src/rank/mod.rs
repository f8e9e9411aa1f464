//! One rank of the partitioned simulation.
//!
//! A [`RankProcess`] owns the agents inside its partition and holds replicas
//! of the agents its neighbours export to it. All of its logic is
//! synchronous; the runner drives it through the tick phases and carries its
//! messages.

mod act;
mod store;
mod sync;

pub use act::ActReport;
pub use store::AgentStore;

use crate::partition::Partition;
use crate::types::RankSummary;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;
use viroscape_core::{
    Agent, AgentFactory, AgentId, AgentKind, Census, GridPoint, Origin, RankId, SimResult, SimRng,
    SimulationParameters, Tick,
};

pub struct RankProcess {
    rank: RankId,
    partition: Arc<Partition>,
    store: AgentStore,
    factory: AgentFactory,
    rng: SimRng,
    /// This rank's share of the starting innate population; the floor for
    /// replacing dead innate cells.
    initial_innate: usize,
    neighbours: BTreeSet<RankId>,
    /// What each neighbour was told to mirror at the last projection.
    exports: BTreeMap<RankId, BTreeSet<AgentId>>,
    /// Agents adopted during status sync, waiting to be placed.
    arrivals: Vec<(AgentId, GridPoint)>,
    summary: RankSummary,
}

/// `total` split over `ranks`, with the remainder going to the lowest ranks.
pub(crate) fn share(total: usize, ranks: usize, rank: RankId) -> usize {
    if ranks == 0 {
        return 0;
    }
    let index = rank.as_i32().max(0) as usize;
    total / ranks + usize::from(index < total % ranks)
}

impl RankProcess {
    pub fn new(
        rank: RankId,
        partition: Arc<Partition>,
        params: SimulationParameters,
    ) -> SimResult<Self> {
        let neighbours = partition.neighbours(rank)?;
        let initial_innate = share(params.population.innate, partition.rank_count(), rank);
        let rng = SimRng::for_rank(params.run.seed, rank);
        Ok(Self {
            rank,
            store: AgentStore::new(rank, partition.geometry()),
            partition,
            factory: AgentFactory::new(rank, params),
            rng,
            initial_innate,
            neighbours,
            exports: BTreeMap::new(),
            arrivals: Vec::new(),
            summary: RankSummary::new(rank),
        })
    }

    /// Create the starting population: one epithelial cell on every owned
    /// point, and this rank's share of each mobile kind at random points.
    pub fn populate(&mut self) -> SimResult<()> {
        let rect = self.partition.rect(self.rank)?;
        for point in rect.points() {
            let cell = self.factory.epithelial(&mut self.rng);
            self.store.add_local(Agent::Epithelial(cell), point)?;
        }

        let ranks = self.partition.rank_count();
        let population = self.factory.params().population.clone();
        for _ in 0..share(population.virions, ranks, self.rank) {
            let virion = self.factory.virion(&mut self.rng, Origin::Initial);
            self.place_randomly(Agent::Virion(virion))?;
        }
        for _ in 0..self.initial_innate {
            let cell = self.factory.innate(&mut self.rng, Origin::Initial);
            self.place_randomly(Agent::Innate(cell))?;
        }
        for _ in 0..share(population.specialised, ranks, self.rank) {
            let cell = self.factory.specialised(&mut self.rng, Origin::Initial);
            self.place_randomly(Agent::Specialised(cell))?;
        }

        debug!(
            rank = %self.rank,
            agents = self.store.local_len(),
            neighbours = self.neighbours.len(),
            "populated"
        );
        Ok(())
    }

    fn place_randomly(&mut self, agent: Agent) -> SimResult<()> {
        let point = self.partition.random_point_in(self.rank, &mut self.rng)?;
        self.store.add_local(agent, point)
    }

    pub fn rank(&self) -> RankId {
        self.rank
    }

    pub fn store(&self) -> &AgentStore {
        &self.store
    }

    /// Direct store access, for seeding scenarios.
    pub fn store_mut(&mut self) -> &mut AgentStore {
        &mut self.store
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn neighbours(&self) -> &BTreeSet<RankId> {
        &self.neighbours
    }

    pub fn initial_innate(&self) -> usize {
        self.initial_innate
    }

    /// Identities issued so far on this rank for `kind`.
    pub fn issued(&self, kind: AgentKind) -> i32 {
        self.factory.issued(kind)
    }

    pub fn census(&self) -> Census {
        self.store.census()
    }

    /// Start a fresh summary for `tick`.
    pub fn begin_tick(&mut self, tick: Tick) {
        debug!(rank = %self.rank, tick, "tick started");
        self.summary = RankSummary::new(self.rank);
    }

    /// This tick's summary, with end-of-tick population sizes.
    pub fn summary(&self) -> RankSummary {
        let mut summary = self.summary.clone();
        summary.local_agents = self.store.local_len();
        summary.replicas = self.store.replica_len();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(dimension: i32, px: i32, py: i32) -> SimulationParameters {
        let mut params = SimulationParameters::default();
        params.grid.dimension = dimension;
        params.grid.processes_x = px;
        params.grid.processes_y = py;
        params
    }

    #[test]
    fn test_share_spreads_remainder() {
        let shares: Vec<usize> = (0..4).map(|r| share(10, 4, RankId::new(r))).collect();
        assert_eq!(shares, vec![3, 3, 2, 2]);
        assert_eq!(shares.iter().sum::<usize>(), 10);
        assert_eq!(share(3, 0, RankId::new(0)), 0);
    }

    #[test]
    fn test_populate_fills_partition() {
        let mut p = params(8, 2, 2);
        p.population.virions = 9;
        p.population.innate = 6;
        p.population.specialised = 1;
        let partition = Arc::new(Partition::from_params(&p.grid).unwrap());

        let mut rank0 = RankProcess::new(RankId::new(0), partition.clone(), p.clone()).unwrap();
        rank0.populate().unwrap();
        let census = rank0.census();
        assert_eq!(census.epithelial_cells(), 16);
        assert_eq!(census.healthy_cells, 16);
        assert_eq!(census.free_virions, 3);
        assert_eq!(census.innate_cells, 2);
        assert_eq!(census.specialised_cells, 1);
        assert_eq!(rank0.initial_innate(), 2);

        let rect = partition.rect(RankId::new(0)).unwrap();
        for id in rank0.store().local_ids(None) {
            assert!(rect.contains(rank0.store().location(&id).unwrap()));
        }

        let mut rank3 = RankProcess::new(RankId::new(3), partition, p).unwrap();
        rank3.populate().unwrap();
        assert_eq!(rank3.census().specialised_cells, 0);
        assert_eq!(rank3.neighbours().len(), 3);
    }

    #[test]
    fn test_populate_totals_match_params() {
        let mut p = params(8, 2, 2);
        p.population.virions = 9;
        p.population.innate = 6;
        p.population.specialised = 1;
        let partition = Arc::new(Partition::from_params(&p.grid).unwrap());

        let mut virions = Vec::new();
        let mut innate = 0;
        let mut specialised = 0;
        for r in 0..4 {
            let mut rank = RankProcess::new(RankId::new(r), partition.clone(), p.clone()).unwrap();
            rank.populate().unwrap();
            let census = rank.census();
            virions.push(census.free_virions);
            innate += census.innate_cells;
            specialised += census.specialised_cells;
        }
        assert_eq!(virions, vec![3, 2, 2, 2]);
        assert_eq!(innate, 6);
        assert_eq!(specialised, 1);
    }
}
