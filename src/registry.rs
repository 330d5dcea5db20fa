//! Feed registry.
//!
//! Resolves the configured feeds into immutable [`Feed`] values, filling in
//! missing epoch lengths from the feed contracts. Read-only after startup.

use tracing::{info, warn};

use crate::chain::ChainClient;
use crate::config::FeedConfig;
use crate::types::{AgentError, Feed};

#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    feeds: Vec<Feed>,
}

impl FeedRegistry {
    /// Build a registry from already-resolved feeds. Duplicate addresses keep
    /// the first occurrence.
    pub fn new(feeds: Vec<Feed>) -> Self {
        let mut registry = Self::default();
        for feed in feeds {
            if registry.get(&feed.address).is_some() {
                warn!(feed = %feed.address, "Duplicate feed address, keeping first entry");
                continue;
            }
            registry.feeds.push(feed);
        }
        registry
    }

    /// Resolve configured feeds, asking the contract for any epoch length the
    /// config leaves out. Any failure is a configuration error.
    pub async fn resolve(
        configs: &[FeedConfig],
        client: &dyn ChainClient,
    ) -> Result<Self, AgentError> {
        let mut feeds = Vec::with_capacity(configs.len());

        for cfg in configs {
            if !Feed::is_valid_address(&cfg.address) {
                return Err(AgentError::FeedResolution {
                    feed: cfg.address.clone(),
                    message: "address is not 0x-prefixed hex".into(),
                });
            }

            let seconds_per_epoch = match cfg.seconds_per_epoch {
                Some(spe) => spe,
                None => client.seconds_per_epoch(&cfg.address).await.map_err(|e| {
                    AgentError::FeedResolution {
                        feed: cfg.address.clone(),
                        message: format!("{e:#}"),
                    }
                })?,
            };

            if seconds_per_epoch == 0 {
                return Err(AgentError::FeedResolution {
                    feed: cfg.address.clone(),
                    message: "seconds_per_epoch is zero".into(),
                });
            }

            let feed = Feed::new(&cfg.address, &cfg.name, seconds_per_epoch);
            info!(feed = %feed, "Feed resolved");
            feeds.push(feed);
        }

        Ok(Self::new(feeds))
    }

    pub fn get(&self, address: &str) -> Option<&Feed> {
        let address = address.trim().to_lowercase();
        self.feeds.iter().find(|f| f.address == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feed> {
        self.feeds.iter()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.feeds.iter().map(|f| f.address.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}
