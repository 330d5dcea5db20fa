//! Polling loop.
//!
//! Fetches the chain head, runs the trade gate for every feed, then sleeps
//! until the nearest epoch boundary (bounded by a floor and a ceiling).
//! Cancellation is observed between iterations only.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::gate::{GateConfig, TradeGate};
use crate::chain::ChainClient;
use crate::registry::FeedRegistry;
use crate::storage::EpochHistoryStore;
use crate::strategy::Strategy;
use crate::types::{AgentError, Block, Evaluation};

/// Start waiting on `signal` now, in its own task, and return a future that
/// resolves once it fires. A signal that fails to install never resolves.
pub fn spawn_shutdown_listener<F>(signal: F) -> impl Future<Output = ()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = tx.send(());
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
    });

    async move {
        if rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub floor: Duration,
    pub ceiling: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(60),
        }
    }
}

impl PollConfig {
    /// Sleep before the next iteration given this iteration's outcomes.
    /// Retryable outcomes pull the wait down to the floor.
    pub fn sleep_for(&self, evaluations: &[(String, Evaluation)]) -> Duration {
        let nearest = evaluations
            .iter()
            .map(|(_, eval)| {
                if eval.decision.is_retryable() {
                    Duration::ZERO
                } else {
                    Duration::from_secs(eval.seconds_left)
                }
            })
            .min()
            .unwrap_or(self.floor);
        nearest.clamp(self.floor, self.ceiling.max(self.floor))
    }
}

/// Summary of one polling iteration.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// `None` when the chain head could not be read.
    pub block: Option<Block>,
    pub evaluations: Vec<(String, Evaluation)>,
    pub sleep: Duration,
}

impl StepReport {
    pub fn trades(&self) -> usize {
        self.evaluations
            .iter()
            .filter(|(_, eval)| eval.decision.attempted())
            .count()
    }
}

pub struct TraderAgent {
    client: Arc<dyn ChainClient>,
    gate: TradeGate,
    poll: PollConfig,
}

impl TraderAgent {
    /// Fails with [`AgentError::NoFeeds`] when there is nothing to trade.
    pub fn new(
        registry: FeedRegistry,
        client: Arc<dyn ChainClient>,
        strategy: Arc<dyn Strategy>,
        history: EpochHistoryStore,
        gate_config: GateConfig,
        poll: PollConfig,
    ) -> Result<Self, AgentError> {
        if registry.is_empty() {
            return Err(AgentError::NoFeeds);
        }

        info!(
            feeds = registry.len(),
            buffer_secs = gate_config.min_buffer_secs,
            cache_dir = %history.dir().display(),
            "Trader agent initialised"
        );

        let gate = TradeGate::new(registry, client.clone(), strategy, history, gate_config);
        Ok(Self { client, gate, poll })
    }

    pub fn gate(&self) -> &TradeGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut TradeGate {
        &mut self.gate
    }

    pub fn history(&self) -> &EpochHistoryStore {
        self.gate.history()
    }

    /// Persist every feed's history.
    pub fn save(&self) -> Result<(), AgentError> {
        self.gate.history().save_all()
    }

    async fn fetch_block(&self) -> anyhow::Result<Block> {
        let number = self.client.current_block_number().await?;
        let timestamp = self.client.block_timestamp(number).await?;
        Ok(Block::new(number, timestamp))
    }

    /// Run one iteration over every feed.
    pub async fn take_step(&mut self) -> StepReport {
        let block = match self.fetch_block().await {
            Ok(block) => block,
            Err(e) => {
                warn!(error = %e, "Failed to read chain head, skipping iteration");
                return StepReport {
                    block: None,
                    evaluations: Vec::new(),
                    sleep: self.poll.floor,
                };
            }
        };

        debug!(
            block = block.number,
            timestamp = block.timestamp,
            time = ?chrono::DateTime::from_timestamp(block.timestamp as i64, 0),
            "New iteration"
        );

        let feeds = self.gate.registry().addresses();
        let mut evaluations = Vec::with_capacity(feeds.len());

        for feed in feeds {
            match self.gate.evaluate(&feed, &block).await {
                Ok(eval) => {
                    debug!(feed = %feed, seconds_left = eval.seconds_left, decision = %eval.decision, "Evaluated");
                    evaluations.push((feed, eval));
                }
                Err(e) => error!(feed = %feed, error = %e, "Evaluation failed"),
            }
        }

        let sleep = self.poll.sleep_for(&evaluations);
        StepReport {
            block: Some(block),
            evaluations,
            sleep,
        }
    }

    /// Run until the process is terminated, or for a single iteration when
    /// `exit_after_one_iteration` is set.
    pub async fn run(&mut self, exit_after_one_iteration: bool) -> Result<(), AgentError> {
        self.run_until(exit_after_one_iteration, std::future::pending::<()>())
            .await
    }

    /// Like [`run`](Self::run), also stopping once `shutdown` resolves. The
    /// signal is only observed while sleeping between iterations; pass a
    /// [`spawn_shutdown_listener`] future so a signal raised mid-iteration
    /// is still caught.
    pub async fn run_until<F>(
        &mut self,
        exit_after_one_iteration: bool,
        shutdown: F,
    ) -> Result<(), AgentError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let report = self.take_step().await;
            if let Some(block) = report.block {
                info!(
                    block = block.number,
                    feeds = report.evaluations.len(),
                    trades = report.trades(),
                    sleep_secs = report.sleep.as_secs(),
                    "Iteration complete"
                );
            }

            if exit_after_one_iteration {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(report.sleep) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.save()
    }
}
