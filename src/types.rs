//! Shared types for the trader agent.
//!
//! These types form the data model used across all modules.
//! They are kept free of I/O so that the chain, storage, strategy and
//! engine modules can depend on them without circular references.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Epoch numbers are opaque, orderable tokens supplied by the feed contract.
pub type Epoch = u64;

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// A single on-chain prediction feed the agent monitors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    /// Contract address, lowercase.
    pub address: String,
    pub name: String,
    pub seconds_per_epoch: u64,
}

impl Feed {
    pub fn new(address: &str, name: &str, seconds_per_epoch: u64) -> Self {
        Self {
            address: address.trim().to_lowercase(),
            name: name.to_string(),
            seconds_per_epoch,
        }
    }

    /// `0x` followed by 1 to 40 hex digits. History file names are derived
    /// from the address, so anything else is refused at startup.
    pub fn is_valid_address(address: &str) -> bool {
        let address = address.trim();
        let Some(digits) = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
        else {
            return false;
        };
        (1..=40).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Seconds left until the epoch containing `timestamp` closes.
    ///
    /// Always in `(0, seconds_per_epoch]`: a timestamp sitting exactly on a
    /// boundary belongs to the epoch that just opened.
    pub fn seconds_until_epoch_end(&self, timestamp: u64) -> u64 {
        let spe = self.seconds_per_epoch.max(1);
        let epoch_end = (timestamp / spe + 1).saturating_mul(spe);
        epoch_end.saturating_sub(timestamp)
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {}s/epoch)", self.name, self.address, self.seconds_per_epoch)
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// The chain head as seen by one polling iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    /// Header timestamp, unix seconds.
    pub timestamp: u64,
}

impl Block {
    pub fn new(number: u64, timestamp: u64) -> Self {
        Self { number, timestamp }
    }
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// Stake-weighted aggregate prediction for one epoch of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    /// Stake placed on "up".
    pub numerator: u128,
    /// Total stake.
    pub denominator: u128,
}

/// Predicted price direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

impl Prediction {
    pub fn new(numerator: u128, denominator: u128) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Share of stake on "up", in `[0, 1]`.
    /// `None` when nobody staked or the values exceed decimal range.
    pub fn confidence(&self) -> Option<Decimal> {
        if self.denominator == 0 {
            return None;
        }
        let numer = Decimal::from_u128(self.numerator)?;
        let denom = Decimal::from_u128(self.denominator)?;
        numer.checked_div(denom)
    }

    /// Direction implied by the stake split; `None` on an exact tie.
    pub fn direction(&self) -> Option<Direction> {
        let confidence = self.confidence()?;
        if confidence > dec!(0.5) {
            Some(Direction::Up)
        } else if confidence < dec!(0.5) {
            Some(Direction::Down)
        } else {
            None
        }
    }

    /// Confidence in whichever side is favoured, `max(c, 1 - c)`.
    pub fn conviction(&self) -> Option<Decimal> {
        let c = self.confidence()?;
        Some(c.max(Decimal::ONE - c))
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.direction(), self.confidence()) {
            (Some(dir), Some(c)) => write!(f, "{dir} @ {:.1}%", c * dec!(100)),
            (None, Some(_)) => write!(f, "FLAT @ 50.0%"),
            _ => write!(f, "no stake"),
        }
    }
}

// ---------------------------------------------------------------------------
// Gate outcomes
// ---------------------------------------------------------------------------

/// What the trade gate decided for one (feed, block) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Fewer seconds left than the configured buffer.
    TooLate,
    /// The feed contract could not report its current epoch.
    EpochUnavailable { reason: String },
    /// This epoch is already in the feed's history.
    AlreadyTraded { epoch: Epoch },
    /// Every prediction fetch attempt failed; the epoch stays open for retry.
    PredictionUnavailable { epoch: Epoch, reason: String },
    /// Strategy ran and the epoch was recorded.
    Traded { epoch: Epoch },
    /// Strategy returned an error; the epoch was still recorded.
    StrategyFailed { epoch: Epoch, reason: String },
}

impl Decision {
    /// Whether a later poll within the same epoch may still trade.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Decision::EpochUnavailable { .. } | Decision::PredictionUnavailable { .. }
        )
    }

    /// Whether the strategy was invoked.
    pub fn attempted(&self) -> bool {
        matches!(self, Decision::Traded { .. } | Decision::StrategyFailed { .. })
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::TooLate => write!(f, "too late"),
            Decision::EpochUnavailable { reason } => write!(f, "epoch unavailable: {reason}"),
            Decision::AlreadyTraded { epoch } => write!(f, "already traded epoch {epoch}"),
            Decision::PredictionUnavailable { epoch, reason } => {
                write!(f, "prediction unavailable for epoch {epoch}: {reason}")
            }
            Decision::Traded { epoch } => write!(f, "traded epoch {epoch}"),
            Decision::StrategyFailed { epoch, reason } => {
                write!(f, "strategy failed on epoch {epoch}: {reason}")
            }
        }
    }
}

/// Result of a single gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub seconds_left: u64,
    pub decision: Decision,
}

impl Evaluation {
    pub fn new(seconds_left: u64, decision: Decision) -> Self {
        Self {
            seconds_left,
            decision,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the agent.
///
/// Only configuration-class errors leave the agent; per-feed transient
/// failures are folded into [`Decision`] values instead.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("No feeds configured, nothing to trade")]
    NoFeeds,

    #[error("Unknown feed: {0}")]
    UnknownFeed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to resolve feed {feed}: {message}")]
    FeedResolution { feed: String, message: String },

    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
