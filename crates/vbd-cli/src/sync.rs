//! Sync pipeline: upstream source pages into the source's index.
//!
//! For each page: map records to documents, validate them against the
//! index mapping, compare content hashes with what is stored, and bulk write
//! only what changed. Sources run in parallel, pages within a source run in
//! order.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use vbd_client::{BulkItemOutcome, GbifClient, SearchClient};
use vbd_core::{
    content_hash, needs_reprocessing, validate_for_source, AppError, BatchSyncSummary, Source,
    SourceDocument, SourceEntry, SourceRegistry, SourceSettings, SourceSyncResult, SourcesConfig,
    SyncConfig, SyncOutcome, SyncStats,
};

/// Runs sync jobs against one search engine.
pub struct Syncer {
    search: SearchClient,
    gbif: GbifClient,
    registry: SourceRegistry,
    config: SyncConfig,
}

impl Syncer {
    pub fn new(
        search: SearchClient,
        gbif: GbifClient,
        registry: SourceRegistry,
        config: SyncConfig,
    ) -> Self {
        Self {
            search,
            gbif,
            registry,
            config,
        }
    }

    /// Syncs every enabled source, `concurrency` at a time.
    pub async fn sync_all(&self, sources: &SourcesConfig, prune: bool) -> BatchSyncSummary {
        let enabled: Vec<&SourceSettings> = sources.enabled().collect();
        info!(
            "Syncing {} source(s), {} at a time",
            enabled.len(),
            self.config.concurrency
        );

        let results: Vec<SourceSyncResult> = stream::iter(enabled)
            .filter_map(|settings| async move {
                match settings.source() {
                    Ok(source) => Some((source, settings)),
                    Err(e) => {
                        warn!("Skipping source '{}': {}", settings.name, e);
                        None
                    }
                }
            })
            .map(|(source, settings)| self.sync_source(source, settings, prune))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut summary = BatchSyncSummary::new();
        for result in results {
            summary.add(result);
        }
        summary
    }

    /// Syncs one source. Errors that abort the run end up in the result.
    pub async fn sync_source(
        &self,
        source: Source,
        settings: &SourceSettings,
        prune: bool,
    ) -> SourceSyncResult {
        let mut stats = SyncStats::new();

        match self.run_source(source, settings, prune, &mut stats).await {
            Ok(()) => {
                info!(
                    "[{}] Sync complete: {} created, {} updated, {} unchanged, {} failed, {} deleted",
                    source, stats.created, stats.updated, stats.unchanged, stats.failed, stats.deleted
                );
                SourceSyncResult::success(source, stats)
            }
            Err(e) => {
                warn!("[{}] Sync aborted: {}", source, e.user_message());
                SourceSyncResult::failure(source, stats, e.to_string())
            }
        }
    }

    async fn run_source(
        &self,
        source: Source,
        settings: &SourceSettings,
        prune: bool,
        stats: &mut SyncStats,
    ) -> Result<(), AppError> {
        let entry = self.registry.entry(source);
        let status = self.search.ensure_index(entry).await?;
        debug!("[{}] Index '{}': {:?}", source, entry.index_name, status);

        let seen = match source {
            Source::Gbif => self.pull_gbif(entry, settings, stats).await?,
        };

        if prune {
            match seen {
                Some(ids) => self.prune(entry, &ids, stats).await?,
                None => warn!(
                    "[{}] Run was capped by max_records, skipping prune",
                    source
                ),
            }
        }

        Ok(())
    }

    /// Pages through GBIF. Returns every id seen, or `None` when the run was
    /// capped before the end of the upstream results.
    async fn pull_gbif(
        &self,
        entry: &SourceEntry,
        settings: &SourceSettings,
        stats: &mut SyncStats,
    ) -> Result<Option<HashSet<String>>, AppError> {
        let page_size = settings.page_size.unwrap_or(self.config.page_size);
        let mut seen = HashSet::new();
        let mut offset: u64 = 0;

        loop {
            let page = self
                .gbif
                .search_datasets(settings, offset, page_size)
                .await?;
            let fetched = (page.results.len() + page.skipped) as u64;
            for _ in 0..page.skipped {
                stats.record(SyncOutcome::Failed);
            }

            let mut docs: Vec<_> = page.results.into_iter().map(GbifClient::into_doc).collect();

            let mut capped = false;
            if let Some(max) = settings.max_records {
                let remaining = max.saturating_sub(offset) as usize;
                if docs.len() >= remaining {
                    docs.truncate(remaining);
                    capped = !page.end_of_records || fetched as usize > remaining;
                }
            }

            info!(
                "[{}] Page at offset {}: {} record(s){}",
                entry.source,
                offset,
                docs.len(),
                page.count
                    .map(|c| format!(" of {}", c))
                    .unwrap_or_default()
            );

            // Offset paging can shift under concurrent upstream changes and
            // repeat a record already written from an earlier page.
            docs.retain(|d| {
                let repeat = seen.contains(d.doc_id());
                if repeat {
                    debug!("[{}] {} already synced this run", entry.source, d.doc_id());
                }
                !repeat
            });

            seen.extend(docs.iter().map(|d| d.doc_id().to_string()));
            self.write_batch(entry, &docs, stats).await?;

            offset += fetched;
            if capped {
                return Ok(None);
            }
            if page.end_of_records || fetched == 0 {
                break;
            }
        }

        Ok(Some(seen))
    }

    /// Validates, diffs and writes one batch of documents.
    ///
    /// When several documents share an id only the last one is kept.
    pub async fn write_batch<D: SourceDocument>(
        &self,
        entry: &SourceEntry,
        docs: &[D],
        stats: &mut SyncStats,
    ) -> Result<(), AppError> {
        let last: HashMap<&str, usize> = docs
            .iter()
            .enumerate()
            .map(|(i, doc)| (doc.doc_id(), i))
            .collect();

        let mut valid = Vec::with_capacity(last.len());
        for (i, doc) in docs.iter().enumerate() {
            if last.get(doc.doc_id()) != Some(&i) {
                debug!("[{}] Dropping earlier copy of {}", entry.source, doc.doc_id());
                continue;
            }

            let value = serde_json::to_value(doc)?;
            let violations = validate_for_source(&value, entry);
            if violations.is_empty() {
                valid.push((doc, value));
            } else {
                let reasons: Vec<String> = violations.iter().map(ToString::to_string).collect();
                warn!(
                    "[{}] Skipping {}: {}",
                    entry.source,
                    doc.doc_id(),
                    reasons.join("; ")
                );
                stats.record(SyncOutcome::Failed);
            }
        }

        let ids: Vec<String> = valid.iter().map(|(d, _)| d.doc_id().to_string()).collect();
        let stored = self.search.fetch_sources(entry.index_name, &ids).await?;

        let mut to_write = Vec::new();
        for (doc, value) in valid {
            let new_hash = content_hash(&value)?;
            let existing_hash = stored.get(doc.doc_id()).map(content_hash).transpose()?;
            let decision = needs_reprocessing(existing_hash.as_deref(), &new_hash);

            if decision.needs_write {
                debug!("[{}] {}: {}", entry.source, doc.doc_id(), decision.reason);
                to_write.push(doc);
            } else {
                stats.record(decision.outcome);
            }
        }

        if to_write.is_empty() {
            return Ok(());
        }

        let outcomes = self.search.bulk_index(to_write).await?;
        for outcome in outcomes {
            match outcome {
                BulkItemOutcome::Created(_) => stats.record(SyncOutcome::Created),
                BulkItemOutcome::Updated(_) => stats.record(SyncOutcome::Updated),
                BulkItemOutcome::Rejected { id, error } => {
                    warn!("[{}] Rejected {}: {}", entry.source, id, error);
                    stats.record(SyncOutcome::Failed);
                }
                BulkItemOutcome::Deleted(id) | BulkItemOutcome::NotFound(id) => {
                    debug!("[{}] Unexpected delete result for {}", entry.source, id);
                }
            }
        }

        Ok(())
    }

    /// Deletes indexed documents whose id was not seen this run.
    async fn prune(
        &self,
        entry: &SourceEntry,
        seen: &HashSet<String>,
        stats: &mut SyncStats,
    ) -> Result<(), AppError> {
        let batch = self.config.delete_batch_size.max(1);
        let stale: Vec<String> = self
            .search
            .list_ids(entry.index_name, batch)
            .await?
            .into_iter()
            .filter(|id| !seen.contains(id))
            .collect();

        if stale.is_empty() {
            return Ok(());
        }
        info!(
            "[{}] Pruning {} document(s) gone upstream",
            entry.source,
            stale.len()
        );

        for chunk in stale.chunks(batch) {
            for outcome in self.search.bulk_delete(entry.index_name, chunk).await? {
                match outcome {
                    BulkItemOutcome::Deleted(_) => stats.record(SyncOutcome::Deleted),
                    BulkItemOutcome::Rejected { id, error } => {
                        warn!("[{}] Could not delete {}: {}", entry.source, id, error)
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}
