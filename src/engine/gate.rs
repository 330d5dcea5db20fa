//! Trade gate.
//!
//! Decides, per (feed, block), whether the strategy should run: enough time
//! left in the epoch, epoch not yet traded, prediction available. Calling
//! it repeatedly within one epoch is safe; at most one strategy invocation
//! happens per (feed, epoch).

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::chain::ChainClient;
use crate::registry::FeedRegistry;
use crate::storage::EpochHistoryStore;
use crate::strategy::Strategy;
use crate::types::{AgentError, Block, Decision, Epoch, Evaluation, Feed, Prediction};

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Minimum seconds left in the epoch for a trade to be placed.
    pub min_buffer_secs: u64,
    /// Prediction fetch attempts per evaluation, at least 1.
    pub prediction_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_buffer_secs: 20,
            prediction_attempts: 10,
            retry_delay: Duration::from_secs(1),
        }
    }
}

pub struct TradeGate {
    registry: FeedRegistry,
    client: Arc<dyn ChainClient>,
    strategy: Arc<dyn Strategy>,
    history: EpochHistoryStore,
    config: GateConfig,
}

impl TradeGate {
    pub fn new(
        registry: FeedRegistry,
        client: Arc<dyn ChainClient>,
        strategy: Arc<dyn Strategy>,
        history: EpochHistoryStore,
        config: GateConfig,
    ) -> Self {
        Self {
            registry,
            client,
            strategy,
            history,
            config,
        }
    }

    pub fn registry(&self) -> &FeedRegistry {
        &self.registry
    }

    pub fn history(&self) -> &EpochHistoryStore {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut EpochHistoryStore {
        &mut self.history
    }

    /// Evaluate `feed_id` at `block`.
    ///
    /// Only an unknown feed is an error; every external failure is reported
    /// through the returned [`Decision`]. Remaining time is measured from
    /// the block timestamp minus the time spent inside this call, and the
    /// buffer is enforced again before each retry and before the strategy.
    pub async fn evaluate(&mut self, feed_id: &str, block: &Block) -> Result<Evaluation, AgentError> {
        let started = Instant::now();
        let feed = self
            .registry
            .get(feed_id)
            .cloned()
            .ok_or_else(|| AgentError::UnknownFeed(feed_id.to_string()))?;

        let seconds_left = feed.seconds_until_epoch_end(block.timestamp);

        if seconds_left < self.config.min_buffer_secs {
            debug!(
                feed = %feed.name,
                seconds_left,
                buffer = self.config.min_buffer_secs,
                "Too close to epoch end, skipping"
            );
            return Ok(Evaluation::new(seconds_left, Decision::TooLate));
        }

        let epoch = match self.client.current_epoch(&feed).await {
            Ok(epoch) => epoch,
            Err(e) => {
                warn!(feed = %feed.name, error = %e, "Failed to read current epoch");
                return Ok(Evaluation::new(
                    remaining(seconds_left, started),
                    Decision::EpochUnavailable {
                        reason: format!("{e:#}"),
                    },
                ));
            }
        };

        if self.history.contains(&feed.address, epoch) {
            debug!(feed = %feed.name, epoch, "Epoch already traded");
            return Ok(Evaluation::new(
                remaining(seconds_left, started),
                Decision::AlreadyTraded { epoch },
            ));
        }

        let prediction = match self.fetch_prediction(&feed, epoch, seconds_left, started).await {
            Ok(prediction) => prediction,
            Err(FetchFailure::Expired(left)) => return Ok(Evaluation::new(left, Decision::TooLate)),
            Err(FetchFailure::Failed(reason)) => {
                return Ok(Evaluation::new(
                    remaining(seconds_left, started),
                    Decision::PredictionUnavailable { epoch, reason },
                ));
            }
        };

        let seconds_left = remaining(seconds_left, started);
        if seconds_left < self.config.min_buffer_secs {
            warn!(
                feed = %feed.name,
                epoch,
                seconds_left,
                buffer = self.config.min_buffer_secs,
                "Buffer passed while fetching prediction, skipping"
            );
            return Ok(Evaluation::new(seconds_left, Decision::TooLate));
        }

        info!(
            feed = %feed.name,
            epoch,
            block = block.number,
            seconds_left,
            prediction = %prediction,
            "Executing strategy"
        );
        let outcome = self.strategy.execute(&feed, &prediction).await;

        self.history.append(&feed.address, epoch);
        if let Err(e) = self.history.save(&feed.address) {
            error!(feed = %feed.name, epoch, error = %e, "Failed to persist traded epoch");
        }

        let decision = match outcome {
            Ok(()) => Decision::Traded { epoch },
            Err(e) => {
                error!(feed = %feed.name, epoch, error = %e, "Strategy failed");
                Decision::StrategyFailed {
                    epoch,
                    reason: format!("{e:#}"),
                }
            }
        };

        Ok(Evaluation::new(seconds_left, decision))
    }

    /// Fetch the prediction, retrying up to the configured attempt count.
    /// Gives up early once a retry would start inside the buffer.
    async fn fetch_prediction(
        &self,
        feed: &Feed,
        epoch: Epoch,
        seconds_left: u64,
        started: Instant,
    ) -> Result<Prediction, FetchFailure> {
        let attempts = self.config.prediction_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                if !self.config.retry_delay.is_zero() {
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                let left = remaining(seconds_left, started);
                if left < self.config.min_buffer_secs {
                    warn!(
                        feed = %feed.name,
                        epoch,
                        attempt,
                        seconds_left = left,
                        buffer = self.config.min_buffer_secs,
                        "Buffer passed while retrying prediction, giving up"
                    );
                    return Err(FetchFailure::Expired(left));
                }
            }

            match self.client.aggregated_prediction(feed, epoch).await {
                Ok(prediction) => return Ok(prediction),
                Err(e) => {
                    last_error = format!("{e:#}");
                    warn!(
                        feed = %feed.name,
                        epoch,
                        attempt,
                        attempts,
                        error = %last_error,
                        "Prediction fetch failed"
                    );
                }
            }
        }

        Err(FetchFailure::Failed(last_error))
    }
}

enum FetchFailure {
    /// Remaining seconds fell below the buffer; carries the recomputed value.
    Expired(u64),
    Failed(String),
}

/// Seconds left in the epoch after the time elapsed since `started`.
fn remaining(seconds_left: u64, started: Instant) -> u64 {
    seconds_left.saturating_sub(started.elapsed().as_secs())
}
