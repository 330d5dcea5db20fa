//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The RPC endpoint (which usually embeds an API key) is referenced by
//! env-var name in the config and resolved at runtime.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{AgentError, Feed};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Minimum seconds that must remain in an epoch before trading.
    #[serde(default = "default_min_buffer")]
    pub min_buffer_secs: u64,
    /// Prediction fetch attempts per evaluation.
    #[serde(default = "default_prediction_attempts")]
    pub prediction_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_poll_floor")]
    pub poll_floor_secs: u64,
    #[serde(default = "default_poll_ceiling")]
    pub poll_ceiling_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    /// Name of the environment variable holding the JSON-RPC URL.
    #[serde(default = "default_rpc_url_env")]
    pub rpc_url_env: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Number of most recent traded epochs kept per feed.
    #[serde(default = "default_retention")]
    pub retention: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    DryRun,
    Threshold,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    #[serde(default)]
    pub kind: StrategyKind,
    /// Only used by the threshold strategy.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub address: String,
    pub name: String,
    /// Read from the contract when omitted.
    #[serde(default)]
    pub seconds_per_epoch: Option<u64>,
}

fn default_min_buffer() -> u64 {
    20
}
fn default_prediction_attempts() -> u32 {
    10
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_poll_floor() -> u64 {
    1
}
fn default_poll_ceiling() -> u64 {
    60
}
fn default_rpc_url_env() -> String {
    "RPC_URL".to_string()
}
fn default_request_timeout() -> u64 {
    10
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(".trader_cache")
}
fn default_retention() -> usize {
    8
}
fn default_min_confidence() -> Decimal {
    dec!(0.55)
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url_env: default_rpc_url_env(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            retention: default_retention(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::default(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl AgentConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn poll_floor(&self) -> Duration {
        Duration::from_secs(self.poll_floor_secs)
    }

    pub fn poll_ceiling(&self) -> Duration {
        Duration::from_secs(self.poll_ceiling_secs)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.cache.retention == 0 {
            return Err(AgentError::Config("cache.retention must be at least 1".into()));
        }
        if self.agent.prediction_attempts == 0 {
            return Err(AgentError::Config(
                "agent.prediction_attempts must be at least 1".into(),
            ));
        }
        if self.agent.poll_floor_secs > self.agent.poll_ceiling_secs {
            return Err(AgentError::Config(format!(
                "agent.poll_floor_secs ({}) exceeds agent.poll_ceiling_secs ({})",
                self.agent.poll_floor_secs, self.agent.poll_ceiling_secs
            )));
        }
        if let Some(feed) = self.feeds.iter().find(|f| !Feed::is_valid_address(&f.address)) {
            return Err(AgentError::Config(format!(
                "feed address {:?} is not a 0x-prefixed hex address",
                feed.address
            )));
        }
        if let Some(feed) = self.feeds.iter().find(|f| f.seconds_per_epoch == Some(0)) {
            return Err(AgentError::Config(format!(
                "feed {} has seconds_per_epoch = 0",
                feed.address
            )));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
