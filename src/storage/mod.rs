//! Persistence layer.
//!
//! Keeps the bounded per-feed history of traded epochs and mirrors it to
//! one small JSON file per feed under the cache directory. A missing or
//! unreadable file is a cache miss, never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{AgentError, Epoch};

/// On-disk form of one feed's history.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryRecord {
    feed: String,
    epochs: Vec<Epoch>,
    saved_at: DateTime<Utc>,
}

/// Traded-epoch history for every feed, owned by a single agent.
#[derive(Debug)]
pub struct EpochHistoryStore {
    dir: PathBuf,
    retention: usize,
    records: HashMap<String, VecDeque<Epoch>>,
}

impl EpochHistoryStore {
    /// Create an empty store. `retention` is clamped to at least 1.
    pub fn new(dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            dir: dir.into(),
            retention: retention.max(1),
            records: HashMap::new(),
        }
    }

    /// Create a store and restore history for each of `feeds`.
    pub fn open<I, S>(dir: impl Into<PathBuf>, retention: usize, feeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut store = Self::new(dir, retention);
        for feed in feeds {
            store.load(feed.as_ref());
        }
        store
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Read the persisted history for `feed` into memory, replacing any
    /// in-memory record, and return it oldest first.
    pub fn load(&mut self, feed: &str) -> Vec<Epoch> {
        let path = self.path_for(feed);
        let mut epochs: VecDeque<Epoch> = read_record(&path, feed).into();
        while epochs.len() > self.retention {
            epochs.pop_front();
        }

        if !epochs.is_empty() {
            info!(feed, count = epochs.len(), latest = ?epochs.back(), "Restored traded epochs");
        }

        let snapshot = epochs.iter().copied().collect();
        self.records.insert(feed.to_string(), epochs);
        snapshot
    }

    /// Record `epoch` as traded for `feed`. Returns false if it was already
    /// present. The oldest entries are evicted beyond the retention bound.
    pub fn append(&mut self, feed: &str, epoch: Epoch) -> bool {
        let retention = self.retention;
        let epochs = self.records.entry(feed.to_string()).or_default();
        if epochs.contains(&epoch) {
            return false;
        }
        epochs.push_back(epoch);
        while epochs.len() > retention {
            epochs.pop_front();
        }
        true
    }

    pub fn contains(&self, feed: &str, epoch: Epoch) -> bool {
        self.records
            .get(feed)
            .is_some_and(|epochs| epochs.contains(&epoch))
    }

    /// Current history for `feed`, oldest first.
    pub fn epochs(&self, feed: &str) -> Vec<Epoch> {
        self.records
            .get(feed)
            .map(|epochs| epochs.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, feed: &str) -> usize {
        self.records.get(feed).map_or(0, VecDeque::len)
    }

    /// Persist `feed`'s history, overwriting the previous file.
    ///
    /// The snapshot is written to a temporary sibling and renamed into place,
    /// so a reader sees either the old or the new record.
    pub fn save(&self, feed: &str) -> Result<(), AgentError> {
        let record = HistoryRecord {
            feed: feed.to_string(),
            epochs: self.epochs(feed),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        std::fs::create_dir_all(&self.dir).map_err(|source| AgentError::Storage {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(feed);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", file_stem(feed), uuid::Uuid::new_v4()));

        if let Err(source) = std::fs::write(&tmp, &json) {
            let _ = std::fs::remove_file(&tmp);
            return Err(AgentError::Storage { path: tmp, source });
        }
        if let Err(source) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(AgentError::Storage { path, source });
        }

        debug!(feed, count = record.epochs.len(), path = %path.display(), "History saved");
        Ok(())
    }

    /// Persist every feed with an in-memory record.
    pub fn save_all(&self) -> Result<(), AgentError> {
        for feed in self.records.keys() {
            self.save(feed)?;
        }
        Ok(())
    }

    fn path_for(&self, feed: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(feed)))
    }
}

/// Feed ids are contract addresses and pass through unchanged. Any other
/// byte, `_` included, is escaped as `_xx` so distinct ids never share a file.
fn file_stem(feed: &str) -> String {
    let mut stem = String::with_capacity(feed.len());
    for b in feed.bytes() {
        if b.is_ascii_alphanumeric() {
            stem.push(char::from(b));
        } else {
            stem.push_str(&format!("_{b:02x}"));
        }
    }
    stem
}

fn read_record(path: &Path, feed: &str) -> Vec<Epoch> {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(feed, path = %path.display(), "No saved history, starting fresh");
            return Vec::new();
        }
        Err(e) => {
            warn!(feed, path = %path.display(), error = %e, "Unreadable history, ignoring");
            return Vec::new();
        }
    };

    match serde_json::from_str::<HistoryRecord>(&json) {
        Ok(record) if record.feed == feed => record.epochs,
        Ok(record) => {
            warn!(feed, found = %record.feed, "History belongs to another feed, ignoring");
            Vec::new()
        }
        Err(e) => {
            warn!(feed, path = %path.display(), error = %e, "Corrupt history, ignoring");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
