//! Sync bookkeeping: delta detection and per-run statistics.
//!
//! Pure logic, decoupled from the HTTP clients and CLI orchestration.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::source::Source;

/// Outcome of processing a single document during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Stored document hash matches - nothing written
    Unchanged,
    /// Stored document differs - overwritten
    Updated,
    /// Not stored before - written for the first time
    Created,
    /// Document rejected (schema violation or write error) and skipped
    Failed,
    /// Stored document no longer exists upstream - removed
    Deleted,
}

/// Statistics for one source's sync run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub unchanged: usize,
    pub updated: usize,
    pub created: usize,
    pub failed: usize,
    pub deleted: usize,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Unchanged => self.unchanged += 1,
            SyncOutcome::Updated => self.updated += 1,
            SyncOutcome::Created => self.created += 1,
            SyncOutcome::Failed => self.failed += 1,
            SyncOutcome::Deleted => self.deleted += 1,
        }
    }

    /// Number of upstream records processed. Deletions are not counted.
    pub fn total(&self) -> usize {
        self.unchanged + self.updated + self.created + self.failed
    }

    pub fn successful(&self) -> usize {
        self.unchanged + self.updated + self.created
    }

    /// Documents actually written to the index.
    pub fn written(&self) -> usize {
        self.updated + self.created
    }
}

/// Result of delta detection for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReprocessingDecision {
    pub needs_write: bool,
    pub outcome: SyncOutcome,
    pub reason: &'static str,
}

/// Decides whether a document must be (re)written.
///
/// `existing_hash` is the hash of the stored document, `None` if the index
/// has no document with this id.
pub fn needs_reprocessing(existing_hash: Option<&str>, new_hash: &str) -> ReprocessingDecision {
    match existing_hash {
        Some(hash) if hash == new_hash => ReprocessingDecision {
            needs_write: false,
            outcome: SyncOutcome::Unchanged,
            reason: "content hash matches",
        },
        Some(_) => ReprocessingDecision {
            needs_write: true,
            outcome: SyncOutcome::Updated,
            reason: "content hash changed",
        },
        None => ReprocessingDecision {
            needs_write: true,
            outcome: SyncOutcome::Created,
            reason: "new document",
        },
    }
}

/// SHA-256 hex digest of a value's JSON form with object keys sorted.
///
/// A typed document and the same document read back from the index hash
/// identically regardless of field order.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<String, AppError> {
    let canonical = canonicalize(serde_json::to_value(value)?);
    let bytes = serde_json::to_vec(&canonical)?;

    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

// =============================================================================
// Batch Sync Types
// =============================================================================

/// Result of syncing one source.
#[derive(Debug, Clone)]
pub struct SourceSyncResult {
    pub source: Source,
    pub stats: SyncStats,
    /// Error message if the run aborted, None if it completed.
    pub error: Option<String>,
}

impl SourceSyncResult {
    pub fn success(source: Source, stats: SyncStats) -> Self {
        Self {
            source,
            stats,
            error: None,
        }
    }

    /// A run that aborted. Stats gathered before the abort are kept.
    pub fn failure(source: Source, stats: SyncStats, error: String) -> Self {
        Self {
            source,
            stats,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated results from syncing several sources.
#[derive(Debug, Clone, Default)]
pub struct BatchSyncSummary {
    pub results: Vec<SourceSyncResult>,
}

impl BatchSyncSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: SourceSyncResult) {
        self.results.push(result);
    }

    pub fn successful_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    pub fn total_documents(&self) -> usize {
        self.results.iter().map(|r| r.stats.total()).sum()
    }

    pub fn total_sources(&self) -> usize {
        self.results.len()
    }
}
