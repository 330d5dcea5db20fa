//! Strategy capability.
//!
//! The agent only decides *when* to act on a feed; what to do with the
//! prediction is delegated to a [`Strategy`]. Implementations:
//! - [`dry_run::DryRunStrategy`] logs the would-be trade (default)
//! - [`threshold::ThresholdStrategy`] skips low-conviction predictions,
//!   delegating the rest to an inner strategy

pub mod dry_run;
pub mod threshold;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{StrategyConfig, StrategyKind};
use crate::types::{Feed, Prediction};

pub use dry_run::DryRunStrategy;
pub use threshold::ThresholdStrategy;

/// Something that acts on a feed's prediction once per epoch.
///
/// An `Err` is reported to the operator but the epoch still counts as
/// traded.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn execute(&self, feed: &Feed, prediction: &Prediction) -> Result<()>;
}

/// Build the strategy selected in config.
pub fn from_config(cfg: &StrategyConfig) -> Arc<dyn Strategy> {
    match cfg.kind {
        StrategyKind::DryRun => Arc::new(DryRunStrategy),
        StrategyKind::Threshold => Arc::new(ThresholdStrategy::new(
            cfg.min_confidence,
            Arc::new(DryRunStrategy),
        )),
    }
}
