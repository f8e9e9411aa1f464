//! Async distributed tick runner.
//!
//! Drives a cluster of ranks through the phases of each tick, carrying their
//! messages over a [`Transport`] and holding them at the coordinator's
//! barrier between phases.

use crate::coordinator::Coordinator;
use crate::partition::Partition;
use crate::rank::RankProcess;
use crate::transport::{InProcessTransport, Transport};
use crate::types::*;
use crate::wire::Envelope;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::{debug, error, info};
use viroscape_core::{Census, SimulationParameters, Tick};

/// Configuration for the distributed runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Timeout for each phase in milliseconds.
    pub phase_timeout_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            phase_timeout_ms: 30_000,
        }
    }
}

/// Orchestrates distributed tick execution.
///
/// Each tick runs five phases in order, every one of them on all ranks
/// before the next begins:
///
/// 1. **Act**: reconcile replica requests, step local agents in shuffled
///    order, spawn and remove.
/// 2. **Rebalance**: hand agents that left a partition to the new owner.
/// 3. **SyncStatus**: receivers adopt the transferred agents.
/// 4. **SyncProjection**: arrivals are placed and each rank tells its
///    neighbours which of its agents they should mirror.
/// 5. **SyncStates**: every replica is refreshed from its owner.
///
/// A phase is made of message rounds. In a round all inboxes are drained
/// first, then each rank consumes its inbox and posts what it produced, so
/// nothing posted in a round is read before the next one.
///
/// # Example
///
/// ```ignore
/// use viroscape_distributed::{DistributedRunner, RunnerConfig};
///
/// let runner = DistributedRunner::from_params(params, RunnerConfig::default()).await?;
/// let reports = runner.run(10).await?;
/// println!("healthy after 10 ticks: {}", reports[9].census.healthy_cells);
/// ```
pub struct DistributedRunner {
    coordinator: Arc<Coordinator>,
    ranks: Vec<Arc<RwLock<RankProcess>>>,
    transport: Arc<dyn Transport>,
    config: RunnerConfig,
}

impl DistributedRunner {
    /// Create a runner with empty ranks.
    ///
    /// # Arguments
    ///
    /// * `params` - Validated before anything is built
    /// * `config` - Runner configuration
    ///
    /// # Errors
    ///
    /// Returns the configuration error if `params` does not validate.
    pub fn new(params: SimulationParameters, config: RunnerConfig) -> DistributedResult<Self> {
        params.validate()?;
        let partition = Arc::new(Partition::from_params(&params.grid)?);
        let coordinator = Arc::new(Coordinator::new(
            partition.clone(),
            Duration::from_millis(config.phase_timeout_ms),
        ));
        let transport: Arc<dyn Transport> = Arc::new(InProcessTransport::new(partition.ranks()));

        let ranks = partition
            .ranks()
            .map(|rank| {
                RankProcess::new(rank, partition.clone(), params.clone())
                    .map(|process| Arc::new(RwLock::new(process)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            coordinator,
            ranks,
            transport,
            config,
        })
    }

    /// Create a runner, populate every rank and mirror the starting border
    /// agents.
    pub async fn from_params(params: SimulationParameters, config: RunnerConfig) -> DistributedResult<Self> {
        let runner = Self::new(params, config)?;
        runner.populate().await?;
        Ok(runner)
    }

    /// Create the starting population on every rank, then sync replicas.
    pub async fn populate(&self) -> DistributedResult<()> {
        for rank in &self.ranks {
            rank.write().await.populate()?;
        }
        self.sync_replicas().await?;
        info!(
            ranks = self.ranks.len(),
            agents = self.census().await.total_agents,
            "cluster populated"
        );
        Ok(())
    }

    /// Bring every neighbour's replicas in line with the current owners,
    /// outside of any tick. Used after populating or seeding the ranks.
    pub async fn sync_replicas(&self) -> DistributedResult<()> {
        self.project().await?;
        self.refresh().await
    }

    /// Run a single distributed tick.
    ///
    /// # Returns
    ///
    /// A `TickReport` with the number of the completed tick, the summed
    /// census and one summary per rank.
    ///
    /// # Errors
    ///
    /// Returns a `DistributedError` if:
    /// - A phase times out at the barrier
    /// - A sync round finds the ranks disagreeing about an agent
    pub async fn tick(&self) -> DistributedResult<TickReport> {
        let tick = self.coordinator.current_tick();

        for phase in TickPhase::ALL {
            if let Err(e) = self.run_phase(phase, tick).await {
                error!(tick, %phase, error = %e, "tick aborted");
                return Err(e);
            }
        }

        let completed = self.coordinator.advance_tick().await;
        let report = self.report(completed).await;
        info!(
            tick = completed,
            healthy = report.census.healthy_cells,
            infected = report.census.infected_cells,
            dead = report.census.dead_cells,
            virions = report.census.free_virions,
            transferred = report.transferred(),
            refreshed = report.refreshed(),
            "tick complete"
        );
        Ok(report)
    }

    /// Run multiple ticks.
    ///
    /// # Arguments
    ///
    /// * `num_ticks` - Number of ticks to execute
    ///
    /// # Returns
    ///
    /// A vector of `TickReport` for each tick executed.
    pub async fn run(&self, num_ticks: u64) -> DistributedResult<Vec<TickReport>> {
        let mut reports = Vec::with_capacity(num_ticks as usize);
        for _ in 0..num_ticks {
            reports.push(self.tick().await?);
        }
        Ok(reports)
    }

    /// Final census after the last tick.
    pub async fn finalize(&self) -> Census {
        let census = self.census().await;
        info!(
            ticks = self.coordinator.current_tick(),
            healthy = census.healthy_cells,
            infected = census.infected_cells,
            dead = census.dead_cells,
            "run finished"
        );
        census
    }

    /// Owned agents across all ranks.
    pub async fn census(&self) -> Census {
        let mut census = Census::default();
        for rank in &self.ranks {
            census += rank.read().await.census();
        }
        census
    }

    async fn report(&self, tick: Tick) -> TickReport {
        let mut census = Census::default();
        let mut ranks = Vec::with_capacity(self.ranks.len());
        for rank in &self.ranks {
            let process = rank.read().await;
            census += process.census();
            ranks.push(process.summary());
        }
        TickReport { tick, census, ranks }
    }

    /// Execute a single phase across all ranks, then wait at the barrier.
    async fn run_phase(&self, phase: TickPhase, tick: Tick) -> DistributedResult<()> {
        match phase {
            TickPhase::Act => {
                self.round(|process, inbox| {
                    reject_stray(phase, &inbox)?;
                    process.begin_tick(tick);
                    process.act();
                    Ok(Vec::new())
                })
                .await?
            }
            TickPhase::Rebalance => {
                self.round(|process, inbox| {
                    reject_stray(phase, &inbox)?;
                    process.rebalance()
                })
                .await?
            }
            TickPhase::SyncStatus => {
                self.round(|process, inbox| {
                    process.sync_status(inbox)?;
                    Ok(Vec::new())
                })
                .await?
            }
            TickPhase::SyncProjection => self.project().await?,
            TickPhase::SyncStates => self.refresh().await?,
        }

        for rank in self.coordinator.partition().ranks() {
            self.coordinator.phase_complete(rank, phase, tick).await?;
        }
        self.coordinator.wait_for_phase(phase, tick).await?;
        debug!(tick, %phase, "phase complete");
        Ok(())
    }

    async fn project(&self) -> DistributedResult<()> {
        self.round(|process, inbox| {
            reject_stray(TickPhase::SyncProjection, &inbox)?;
            process.publish_projection()
        })
        .await?;
        self.round(|process, inbox| {
            process.sync_projection(inbox)?;
            Ok(Vec::new())
        })
        .await
    }

    async fn refresh(&self) -> DistributedResult<()> {
        self.round(|process, inbox| {
            reject_stray(TickPhase::SyncStates, &inbox)?;
            process.request_states()
        })
        .await?;
        self.round(|process, inbox| process.answer_state_requests(inbox))
            .await?;
        self.round(|process, inbox| {
            process.sync_states(inbox)?;
            Ok(Vec::new())
        })
        .await
    }

    /// One message round: drain every inbox, then let each rank consume its
    /// inbox in parallel and post what it produces.
    async fn round<F>(&self, consume: F) -> DistributedResult<()>
    where
        F: Fn(&mut RankProcess, Vec<Envelope>) -> DistributedResult<Vec<Envelope>> + Sync,
    {
        let inboxes = join_all(self.ranks.iter().map(|rank| async move {
            let id = rank.read().await.rank();
            self.transport.drain(id).await
        }))
        .await;

        let consume = &consume;
        let work = self.ranks.iter().zip(inboxes).map(|(rank, inbox)| async move {
            let outgoing = {
                let mut process = rank.write().await;
                consume(&mut *process, inbox?)?
            };
            self.transport.post(outgoing).await
        });

        for result in join_all(work).await {
            result?;
        }
        Ok(())
    }

    /// Get the coordinator.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Get rank count.
    pub fn rank_count(&self) -> usize {
        self.ranks.len()
    }

    /// Get a reference to all ranks, in rank order.
    pub fn ranks(&self) -> &[Arc<RwLock<RankProcess>>] {
        &self.ranks
    }

    /// Get runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }
}

/// Rounds that only produce must start with an empty inbox.
fn reject_stray(phase: TickPhase, inbox: &[Envelope]) -> DistributedResult<()> {
    match inbox.first() {
        None => Ok(()),
        Some(envelope) => Err(DistributedError::UnexpectedMessage {
            from: envelope.from,
            phase,
            message: envelope.open()?.name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::SyncMessage;
    use viroscape_core::RankId;

    fn params(dimension: i32, px: i32, py: i32) -> SimulationParameters {
        let mut params = SimulationParameters::default();
        params.grid.dimension = dimension;
        params.grid.processes_x = px;
        params.grid.processes_y = py;
        params.population.virions = 12;
        params.population.innate = 4;
        params.population.specialised = 0;
        params.run.seed = 7;
        params
    }

    #[tokio::test]
    async fn test_runner_creation() {
        let runner = DistributedRunner::from_params(params(8, 2, 2), RunnerConfig::default())
            .await
            .unwrap();

        assert_eq!(runner.rank_count(), 4);
        assert_eq!(runner.config().phase_timeout_ms, 30_000);
        let census = runner.census().await;
        assert_eq!(census.epithelial_cells(), 64);
        assert_eq!(census.free_virions, 12);
        assert_eq!(census.innate_cells, 4);

        for rank in runner.ranks() {
            assert!(rank.read().await.store().replica_len() > 0);
        }
    }

    #[tokio::test]
    async fn test_invalid_params_rejected() {
        let result = DistributedRunner::new(params(9, 2, 1), RunnerConfig::default());
        assert!(matches!(result, Err(DistributedError::Sim(_))));
    }

    #[tokio::test]
    async fn test_single_tick() {
        let runner = DistributedRunner::from_params(params(8, 2, 1), RunnerConfig::default())
            .await
            .unwrap();

        let report = runner.tick().await.unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.ranks.len(), 2);
        assert_eq!(report.census.epithelial_cells(), 64);
        assert!(report.refreshed() > 0);
        assert_eq!(runner.coordinator().current_tick(), 1);
    }

    #[tokio::test]
    async fn test_multiple_ticks() {
        let runner = DistributedRunner::from_params(params(8, 2, 2), RunnerConfig::default())
            .await
            .unwrap();

        let reports = runner.run(5).await.unwrap();
        assert_eq!(reports.len(), 5);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.tick, (i + 1) as u64);
        }
        assert_eq!(runner.finalize().await, reports[4].census);
    }

    #[tokio::test]
    async fn test_stray_message_aborts_tick() {
        let runner = DistributedRunner::from_params(params(8, 2, 1), RunnerConfig::default())
            .await
            .unwrap();
        let stray = Envelope::seal(
            RankId::new(1),
            RankId::new(0),
            &SyncMessage::StateRequest { ids: Vec::new() },
        )
        .unwrap();
        runner.transport.post(vec![stray]).await.unwrap();

        let result = runner.tick().await;
        assert!(matches!(
            result,
            Err(DistributedError::UnexpectedMessage { phase: TickPhase::Act, .. })
        ));
    }

    #[tokio::test]
    async fn test_config_custom() {
        let config = RunnerConfig {
            phase_timeout_ms: 5_000,
        };
        let runner = DistributedRunner::new(params(8, 1, 1), config).unwrap();
        assert_eq!(runner.config().phase_timeout_ms, 5_000);
        assert_eq!(runner.census().await, Census::default());
    }
}
