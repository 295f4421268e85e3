// Score store: the append-only log of finished games and the views derived from it.

pub mod document;

use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use document::{CorruptPolicy, DocumentBackend, FileBackend, JsonDocument, MemoryBackend};

/// Number of entries returned by a leaderboard query when none is requested.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {location}: {source}")]
    Read {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {location}: {source}")]
    Write {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("{location} is not a valid JSON document: {source}")]
    Corrupt {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One finished game. Never modified once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Seconds survived without pushing the button.
    #[serde(default)]
    pub time: u32,
    /// Number of times the button was pushed anyway.
    #[serde(default)]
    pub clicks: u32,
    /// Records written without one are stamped when first read back.
    #[serde(default = "current_timestamp")]
    pub timestamp: String,
}

impl ScoreRecord {
    /// Create a record stamped with the current time.
    pub fn new(time: u32, clicks: u32) -> Self {
        Self {
            time,
            clicks,
            timestamp: current_timestamp(),
        }
    }
}

fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Aggregate figures over every stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_games: usize,
    pub best_time: u32,
    pub average_time: f64,
    pub total_clicks: u64,
}

impl Statistics {
    pub fn from_records(records: &[ScoreRecord]) -> Self {
        if records.is_empty() {
            return Self {
                total_games: 0,
                best_time: 0,
                average_time: 0.0,
                total_clicks: 0,
            };
        }

        let total_time: u64 = records.iter().map(|r| u64::from(r.time)).sum();
        let mean = total_time as f64 / records.len() as f64;

        Self {
            total_games: records.len(),
            best_time: records.iter().map(|r| r.time).max().unwrap_or(0),
            // Exact halves go to the even neighbour: 0.125 -> 0.12.
            average_time: (mean * 100.0).round_ties_even() / 100.0,
            total_clicks: records.iter().map(|r| u64::from(r.clicks)).sum(),
        }
    }
}

/// Where a freshly appended record landed, taken under the append's lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standing {
    pub rank: usize,
    pub stats: Statistics,
}

/// Rank records by `time`, longest first, keeping append order among ties.
pub fn rank_records(mut records: Vec<ScoreRecord>, limit: usize) -> Vec<ScoreRecord> {
    // `sort_by` is stable, which is what keeps equal times in append order.
    records.sort_by(|a, b| b.time.cmp(&a.time));
    records.truncate(limit);
    records
}

/// Owns the backing document of score records.
///
/// Every operation re-reads the whole document; `append` rewrites it. A single
/// lock covers each read-modify-write so concurrent submissions never lose an
/// update.
pub struct ScoreStore {
    document: Mutex<JsonDocument<ScoreRecord>>,
}

impl ScoreStore {
    pub fn new(backend: impl DocumentBackend + 'static, policy: CorruptPolicy) -> Self {
        Self {
            document: Mutex::new(JsonDocument::new(backend, policy)),
        }
    }

    /// Store backed by a JSON file at `path`. The file is created on first append.
    pub fn open(path: impl Into<PathBuf>, policy: CorruptPolicy) -> Self {
        Self::new(FileBackend::new(path), policy)
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new(), CorruptPolicy::Lenient)
    }

    fn lock(&self) -> MutexGuard<'_, JsonDocument<ScoreRecord>> {
        // The guarded value holds no in-memory state of its own, so a panic in
        // another holder cannot have left it inconsistent.
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn location(&self) -> String {
        self.lock().location()
    }

    /// Append `record` and persist the full collection before returning it.
    /// Callers are responsible for validating the record.
    pub fn append(&self, record: ScoreRecord) -> Result<ScoreRecord, StoreError> {
        self.append_ranked(record).map(|(record, _)| record)
    }

    /// Append `record` and report its rank and the updated statistics from
    /// the same snapshot, so concurrent submissions cannot skew them.
    pub fn append_ranked(
        &self,
        record: ScoreRecord,
    ) -> Result<(ScoreRecord, Standing), StoreError> {
        let document = self.lock();
        let mut records = document.load()?;
        records.push(record.clone());
        document.save(&records)?;
        tracing::debug!(
            location = %document.location(),
            total = records.len(),
            "appended score record"
        );

        let rank = records.iter().filter(|r| r.time > record.time).count() + 1;
        let stats = Statistics::from_records(&records);
        Ok((record, Standing { rank, stats }))
    }

    /// All records in append order.
    pub fn list(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        self.lock().load()
    }

    pub fn leaderboard(&self, limit: usize) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(rank_records(self.list()?, limit))
    }

    pub fn stats(&self) -> Result<Statistics, StoreError> {
        Ok(Statistics::from_records(&self.list()?))
    }

    /// Position a score with this `time` holds: one plus the number of
    /// strictly longer times on record.
    pub fn rank_of(&self, time: u32) -> Result<usize, StoreError> {
        let better = self.list()?.iter().filter(|r| r.time > time).count();
        Ok(better + 1)
    }
}
