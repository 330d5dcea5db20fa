//! Blockchain access.
//!
//! Defines the `ChainClient` trait the agent needs from a node and provides
//! a JSON-RPC implementation in [`rpc`].

pub mod rpc;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Epoch, Feed, Prediction};

/// Abstraction over the chain and the feed contracts deployed on it.
///
/// Every call may fail with a transient external error; callers decide
/// whether a failure is fatal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest block number.
    async fn current_block_number(&self) -> Result<u64>;

    /// Header timestamp of `number`, unix seconds.
    async fn block_timestamp(&self, number: u64) -> Result<u64>;

    /// Epoch the feed contract currently considers active.
    async fn current_epoch(&self, feed: &Feed) -> Result<Epoch>;

    /// Epoch length declared by the feed contract at `address`.
    async fn seconds_per_epoch(&self, address: &str) -> Result<u64>;

    /// Aggregated stake-weighted prediction for `epoch`.
    async fn aggregated_prediction(&self, feed: &Feed, epoch: Epoch) -> Result<Prediction>;
}
