//! Dry-run strategy: reports what it would trade and places nothing.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal_macros::dec;
use tracing::info;

use super::Strategy;
use crate::types::{Feed, Prediction};

#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunStrategy;

#[async_trait]
impl Strategy for DryRunStrategy {
    async fn execute(&self, feed: &Feed, prediction: &Prediction) -> Result<()> {
        match (prediction.direction(), prediction.confidence()) {
            (Some(direction), Some(confidence)) => info!(
                feed = %feed.name,
                address = %feed.address,
                direction = %direction,
                confidence = format!("{:.1}%", confidence * dec!(100)),
                "[DRY RUN] Would trade"
            ),
            _ => info!(
                feed = %feed.name,
                address = %feed.address,
                prediction = %prediction,
                "[DRY RUN] No directional signal"
            ),
        }
        Ok(())
    }
}
