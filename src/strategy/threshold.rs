//! Conviction filter in front of another strategy.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use super::Strategy;
use crate::types::{Feed, Prediction};

/// Forwards only predictions whose favoured side holds at least
/// `min_confidence` of the stake.
pub struct ThresholdStrategy {
    min_confidence: Decimal,
    inner: Arc<dyn Strategy>,
}

impl ThresholdStrategy {
    pub fn new(min_confidence: Decimal, inner: Arc<dyn Strategy>) -> Self {
        Self {
            min_confidence,
            inner,
        }
    }
}

#[async_trait]
impl Strategy for ThresholdStrategy {
    async fn execute(&self, feed: &Feed, prediction: &Prediction) -> Result<()> {
        match prediction.conviction() {
            Some(conviction) if conviction >= self.min_confidence => {
                self.inner.execute(feed, prediction).await
            }
            conviction => {
                debug!(
                    feed = %feed.name,
                    conviction = ?conviction,
                    min = %self.min_confidence,
                    "Conviction below threshold, skipping"
                );
                Ok(())
            }
        }
    }
}
