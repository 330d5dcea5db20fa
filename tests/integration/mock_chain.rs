//! In-memory chain and strategy doubles.
//!
//! `MockChain` serves a controllable chain head, per-feed epochs and
//! predictions, with injectable failures. `RecordingStrategy` remembers
//! every invocation and can be told to fail.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use epoch_trader::chain::ChainClient;
use epoch_trader::strategy::Strategy;
use epoch_trader::types::{Epoch, Feed, Prediction};

#[derive(Default)]
struct ChainState {
    block_number: u64,
    timestamp: u64,
    epochs: HashMap<String, Epoch>,
    predictions: HashMap<String, Prediction>,
    head_error: Option<String>,
    failing_predictions: HashSet<String>,
    prediction_calls: u64,
    prediction_delay: Duration,
}

/// Deterministic chain; clones share state.
#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the head; the block number doubles as its timestamp.
    pub fn set_block(&self, timestamp: u64) {
        let mut state = self.state.lock().unwrap();
        state.block_number = timestamp;
        state.timestamp = timestamp;
    }

    pub fn set_epoch(&self, feed: &str, epoch: Epoch) {
        self.state.lock().unwrap().epochs.insert(feed.to_string(), epoch);
    }

    pub fn set_prediction(&self, feed: &str, prediction: Prediction) {
        self.state
            .lock()
            .unwrap()
            .predictions
            .insert(feed.to_string(), prediction);
    }

    pub fn fail_head(&self, msg: &str) {
        self.state.lock().unwrap().head_error = Some(msg.to_string());
    }

    pub fn fail_predictions(&self, feed: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_predictions
            .insert(feed.to_string());
    }

    /// Latency added to every prediction call.
    pub fn set_prediction_delay(&self, delay: Duration) {
        self.state.lock().unwrap().prediction_delay = delay;
    }

    pub fn clear_errors(&self) {
        let mut state = self.state.lock().unwrap();
        state.head_error = None;
        state.failing_predictions.clear();
    }

    pub fn prediction_calls(&self) -> u64 {
        self.state.lock().unwrap().prediction_calls
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn current_block_number(&self) -> Result<u64> {
        let state = self.state.lock().unwrap();
        match &state.head_error {
            Some(msg) => Err(anyhow!(msg.clone())),
            None => Ok(state.block_number),
        }
    }

    async fn block_timestamp(&self, _number: u64) -> Result<u64> {
        Ok(self.state.lock().unwrap().timestamp)
    }

    async fn current_epoch(&self, feed: &Feed) -> Result<Epoch> {
        self.state
            .lock()
            .unwrap()
            .epochs
            .get(&feed.address)
            .copied()
            .ok_or_else(|| anyhow!("no epoch for {}", feed.address))
    }

    async fn seconds_per_epoch(&self, _address: &str) -> Result<u64> {
        Ok(60)
    }

    async fn aggregated_prediction(&self, feed: &Feed, _epoch: Epoch) -> Result<Prediction> {
        let delay = self.state.lock().unwrap().prediction_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.prediction_calls += 1;
        if state.failing_predictions.contains(&feed.address) {
            return Err(anyhow!("An error occurred while getting agg_predval."));
        }
        Ok(state
            .predictions
            .get(&feed.address)
            .copied()
            .unwrap_or(Prediction::new(1, 2)))
    }
}

/// Strategy that records `(feed address, prediction)` per call.
#[derive(Clone, Default)]
pub struct RecordingStrategy {
    calls: Arc<Mutex<Vec<(String, Prediction)>>>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl RecordingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_error(&self, msg: &str) {
        *self.fail_with.lock().unwrap() = Some(msg.to_string());
    }

    pub fn calls(&self) -> Vec<(String, Prediction)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, feed: &str) -> usize {
        self.calls().iter().filter(|(f, _)| f == feed).count()
    }
}

#[async_trait]
impl Strategy for RecordingStrategy {
    async fn execute(&self, feed: &Feed, prediction: &Prediction) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((feed.address.clone(), *prediction));
        match self.fail_with.lock().unwrap().clone() {
            Some(msg) => Err(anyhow!(msg)),
            None => Ok(()),
        }
    }
}

/// Fresh cache directory under the system temp dir.
pub fn temp_cache_dir() -> PathBuf {
    std::env::temp_dir().join(format!("epoch_trader_it_{}", uuid::Uuid::new_v4()))
}
