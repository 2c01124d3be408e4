//! Indexing pipeline.
//!
//! Orchestrates discovery → filtering → extraction → embedding → storage →
//! metadata, with per-file fault isolation. A single file failing to parse
//! is recorded and skipped; only configuration failures, vector-store
//! unavailability, or total embedder failure abort the run.
//!
//! Per-file ordering guarantee: old fragments are deleted before new ones
//! are inserted, and the file's modification record is only written after
//! both the fragment store and the vector index have committed. A reader
//! between the delete and insert may see an empty file but never a mixture
//! of old and new fragments.

use crate::config::IndexingConfig;
use crate::core::Fragment;
use crate::error::{Error, IndexingFailed, Result};
use crate::extract::{ChunkExtractor, Language};
use crate::fsio::{FileStat, FileSystem};
use crate::index::vector::{VectorEntry, VectorIndex};
use crate::store::{FileModificationRecord, FragmentStore};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Opaque cancellation signal checked at stage boundaries.
///
/// On cancellation, in-flight batches complete (avoiding partial commits),
/// no new work is scheduled, and the run returns a report reflecting
/// committed progress.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives `(percent, message)` progress events.
pub trait ProgressSink: Send + Sync {
    /// Reports progress; `percent` is in `0..=100`.
    fn report(&self, percent: u8, message: &str);
}

/// Adapts a closure into a [`ProgressSink`].
pub struct ProgressFn<F>(pub F);

impl<F> ProgressSink for ProgressFn<F>
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, message: &str) {
        (self.0)(percent, message);
    }
}

/// Discards progress events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _percent: u8, _message: &str) {}
}

/// Retry policy for embedding and vector-store operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts (first try included).
    pub attempts: u32,
    /// Delay before the second attempt.
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after each failure.
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 500,
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds or attempts are exhausted, backing off
    /// exponentially between tries.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last: Option<Error> = None;
        let mut delay_ms = self.base_delay_ms;

        for attempt in 1..=self.attempts.max(1) {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(what, attempt, error = %err, "operation failed");
                    last = Some(err);
                    if attempt < self.attempts.max(1) {
                        std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        {
                            delay_ms = (delay_ms as f64 * self.factor) as u64;
                        }
                    }
                }
            }
        }

        match last {
            Some(err) => Err(err),
            None => op(),
        }
    }
}

/// A file the run could not process.
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    /// Path of the file.
    pub path: String,
    /// Why it failed.
    pub error: String,
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    /// Files committed (fragments + vectors + record).
    pub files: usize,
    /// Fragments committed.
    pub chunks: usize,
    /// Number of per-file errors.
    pub errors: usize,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
    /// Files that failed, with reasons.
    pub failed_files: Vec<FailedFile>,
    /// Human-readable run summary.
    pub summary: String,
}

/// A file that passed collection and filtering.
struct Candidate {
    abs: PathBuf,
    path_str: String,
    language: Language,
    stat: FileStat,
}

/// Extraction output for one file.
struct FileOutcome {
    path_str: String,
    stat: FileStat,
    fragments: Vec<Fragment>,
}

/// Staged, incremental, fault-isolated indexer.
pub struct IndexingPipeline {
    fs: Arc<dyn FileSystem>,
    store: Arc<dyn FragmentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn crate::embedding::Embedder>,
    extractor: ChunkExtractor,
    config: IndexingConfig,
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
    retry: RetryPolicy,
}

impl IndexingPipeline {
    /// Builds a pipeline, validating the config and the dimension agreement
    /// between embedder and vector index.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ConfigError`] for invalid configuration or a
    /// dimension mismatch.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        store: Arc<dyn FragmentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn crate::embedding::Embedder>,
        config: IndexingConfig,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimensions() != index.dimensions() {
            return Err(crate::error::ConfigError::DimensionMismatch {
                embedder: embedder.dimensions(),
                index: index.dimensions(),
            }
            .into());
        }

        let compile = |patterns: &[String]| -> Result<Vec<glob::Pattern>> {
            patterns
                .iter()
                .map(|p| {
                    glob::Pattern::new(p).map_err(|e| {
                        crate::error::ConfigError::InvalidValue {
                            key: "indexing patterns".to_string(),
                            reason: format!("bad glob {p:?}: {e}"),
                        }
                        .into()
                    })
                })
                .collect()
        };

        let extractor = ChunkExtractor::with_sizes(config.chunk_size, config.overlap);
        Ok(Self {
            fs,
            store,
            index,
            embedder,
            extractor,
            include: compile(&config.include_patterns)?,
            exclude: compile(&config.exclude_patterns)?,
            config,
            retry: RetryPolicy::default(),
        })
    }

    /// Overrides the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Indexes the tree rooted at `root`.
    ///
    /// # Errors
    ///
    /// Per-file failures never abort the run; they land in
    /// [`IndexReport::failed_files`]. Fatal failures (vector store down,
    /// embedder exhausted its retries) surface as
    /// [`IndexingFailed`] wrapping the partial report.
    pub fn index(
        &self,
        root: &Path,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let started = Instant::now();
        let mut failed_files: Vec<FailedFile> = Vec::new();

        // Stage 1: collection (0-5%).
        progress.report(0, "collecting files");
        let candidates = self.collect(root, &mut failed_files)?;
        let tracked: std::collections::HashSet<String> =
            candidates.iter().map(|c| c.path_str.clone()).collect();
        progress.report(5, &format!("{} candidate files", candidates.len()));

        // Evict files that disappeared since the last run.
        let stale_removed = self.evict_stale(root, &tracked)?;

        // Stage 2: incremental filter.
        let candidates = if self.config.incremental {
            self.filter_unchanged(candidates)?
        } else {
            candidates
        };
        info!(files = candidates.len(), stale_removed, "indexing");

        // Stage 3: per-file extraction (5-85%).
        let mut outcomes = self.extract_all(&candidates, progress, cancel, &mut failed_files);

        // Stage 4: embedding (85-90%).
        progress.report(85, "computing embeddings");
        self.embed_all(&mut outcomes, cancel, started, &failed_files)?;

        // Stage 5: per-file atomic storage (90-95%).
        progress.report(90, "storing fragments");
        let committed = self.commit_all(&outcomes, cancel, started, &failed_files)?;

        // Stage 6: metadata records (95-100%).
        progress.report(95, "updating file records");
        for outcome in &committed {
            self.store.set_modification_record(&FileModificationRecord {
                path: outcome.path_str.clone(),
                last_indexed_mtime: outcome.stat.mtime_ms,
                file_size: outcome.stat.size,
                checksum: Some(checksum_of(&outcome.fragments)),
            })?;
        }

        let files = committed.len();
        let chunks: usize = committed.iter().map(|o| o.fragments.len()).sum();
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = started.elapsed().as_millis() as u64;
        let summary = format!(
            "indexed {files} files ({chunks} fragments) in {duration_ms}ms; {} failed; {stale_removed} stale evicted",
            failed_files.len(),
        );
        progress.report(100, &summary);
        info!(files, chunks, duration_ms, "indexing complete");

        Ok(IndexReport {
            files,
            chunks,
            errors: failed_files.len(),
            duration_ms,
            failed_files,
            summary,
        })
    }

    /// Walks the root, applying glob, size, and language filters.
    fn collect(&self, root: &Path, failed_files: &mut Vec<FailedFile>) -> Result<Vec<Candidate>> {
        let walked = self.fs.walk(root)?;
        let mut candidates = Vec::new();

        for abs in walked {
            let rel = abs
                .strip_prefix(root)
                .unwrap_or(&abs)
                .to_string_lossy()
                .replace('\\', "/");
            if !self.include.iter().any(|p| p.matches(&rel)) {
                continue;
            }
            if self.exclude.iter().any(|p| p.matches(&rel)) {
                continue;
            }
            let path_str = abs.to_string_lossy().to_string();
            let Some(language) = Language::from_path(&path_str) else {
                continue;
            };
            match self.fs.stat(&abs) {
                Ok(stat) if stat.size > self.config.max_file_size => {
                    debug!(path = %path_str, size = stat.size, "skipping oversized file");
                }
                Ok(stat) => candidates.push(Candidate {
                    abs,
                    path_str,
                    language,
                    stat,
                }),
                Err(err) => failed_files.push(FailedFile {
                    path: path_str,
                    error: err.to_string(),
                }),
            }
        }

        Ok(candidates)
    }

    /// Removes fragments and records of files no longer present under root.
    fn evict_stale(
        &self,
        root: &Path,
        tracked: &std::collections::HashSet<String>,
    ) -> Result<usize> {
        let root_str = root.to_string_lossy().to_string();
        let mut removed = 0;
        for path in self.store.record_paths()? {
            if path.starts_with(&root_str) && !tracked.contains(&path) {
                debug!(path, "evicting stale file");
                self.store.remove_by_file(&path)?;
                self.index.delete_by_file(&path)?;
                self.store.remove_modification_record(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Drops candidates whose stored mtime is current.
    fn filter_unchanged(&self, candidates: Vec<Candidate>) -> Result<Vec<Candidate>> {
        let mut retained = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let unchanged = self
                .store
                .modification_record(&candidate.path_str)?
                .is_some_and(|r| candidate.stat.mtime_ms <= r.last_indexed_mtime);
            if !unchanged {
                retained.push(candidate);
            }
        }
        Ok(retained)
    }

    /// Reads and extracts every candidate, in parallel, isolating failures.
    fn extract_all(
        &self,
        candidates: &[Candidate],
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
        failed_files: &mut Vec<FailedFile>,
    ) -> Vec<FileOutcome> {
        let done = AtomicUsize::new(0);
        let total = candidates.len().max(1);

        let process = |candidate: &Candidate| -> Option<std::result::Result<FileOutcome, FailedFile>> {
            if cancel.is_cancelled() {
                return None;
            }
            let result = self.extract_one(candidate);
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            #[allow(clippy::cast_possible_truncation)]
            let percent = 5 + (80 * finished / total) as u8;
            progress.report(percent, &candidate.path_str);
            Some(result)
        };

        let results: Vec<std::result::Result<FileOutcome, FailedFile>> =
            if self.config.parallelism > 0 {
                match rayon::ThreadPoolBuilder::new()
                    .num_threads(self.config.parallelism)
                    .build()
                {
                    Ok(pool) => {
                        pool.install(|| candidates.par_iter().filter_map(process).collect())
                    }
                    Err(err) => {
                        warn!(error = %err, "falling back to global thread pool");
                        candidates.par_iter().filter_map(process).collect()
                    }
                }
            } else {
                candidates.par_iter().filter_map(process).collect()
            };

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(failure) => failed_files.push(failure),
            }
        }
        // Parallel completion order is nondeterministic; keep commits stable.
        outcomes.sort_by(|a, b| a.path_str.cmp(&b.path_str));
        outcomes
    }

    fn extract_one(&self, candidate: &Candidate) -> std::result::Result<FileOutcome, FailedFile> {
        let to_failure = |err: Error| FailedFile {
            path: candidate.path_str.clone(),
            error: err.to_string(),
        };

        let bytes = self.fs.read(&candidate.abs).map_err(to_failure)?;
        let fragments = self
            .extractor
            .extract(&candidate.path_str, &bytes, candidate.language)
            .map_err(to_failure)?
            .into_iter()
            .map(|f| f.with_last_modified(candidate.stat.mtime_ms))
            .collect();

        Ok(FileOutcome {
            path_str: candidate.path_str.clone(),
            stat: candidate.stat,
            fragments,
        })
    }

    /// Attaches embeddings to every extracted fragment, in batches.
    fn embed_all(
        &self,
        outcomes: &mut [FileOutcome],
        cancel: &CancellationToken,
        started: Instant,
        failed_files: &[FailedFile],
    ) -> Result<()> {
        let batch_size = self
            .config
            .batch_size
            .min(self.embedder.max_batch_size())
            .max(1);

        let mut pending: Vec<&mut Fragment> = outcomes
            .iter_mut()
            .flat_map(|o| o.fragments.iter_mut())
            .collect();

        for batch in pending.chunks_mut(batch_size) {
            if cancel.is_cancelled() {
                // Unembedded fragments keep their files out of the commit.
                break;
            }
            let texts: Vec<&str> = batch.iter().map(|f| f.content.as_str()).collect();
            let vectors = self
                .retry
                .run("embed_batch", || self.embedder.embed_batch(&texts))
                .map_err(|err| self.fatal(err, "embedding failed", started, failed_files))?;

            for (fragment, vector) in batch.iter_mut().zip(vectors) {
                fragment.set_embedding(vector);
            }
        }

        Ok(())
    }

    /// Commits each fully embedded file: delete old, insert new.
    fn commit_all<'a>(
        &self,
        outcomes: &'a [FileOutcome],
        cancel: &CancellationToken,
        started: Instant,
        failed_files: &[FailedFile],
    ) -> Result<Vec<&'a FileOutcome>> {
        let mut committed = Vec::new();

        for outcome in outcomes {
            if cancel.is_cancelled() {
                break;
            }
            if !outcome.fragments.iter().all(Fragment::has_embedding) {
                continue;
            }

            let commit = || -> Result<()> {
                self.store.remove_by_file(&outcome.path_str)?;
                self.index.delete_by_file(&outcome.path_str)?;
                self.store.insert_batch(&outcome.fragments)?;
                let entries: Vec<VectorEntry> = outcome
                    .fragments
                    .iter()
                    .filter_map(|f| {
                        f.embedding.as_ref().map(|v| VectorEntry {
                            id: f.id.clone(),
                            file_path: f.file_path.clone(),
                            vector: v.clone(),
                        })
                    })
                    .collect();
                self.index.insert_batch(entries)
            };

            if let Err(err) = self.retry.run("commit_file", commit) {
                // The store side may already hold this file's fragments
                // (e.g. the index insert was the failing step). Undo it so
                // no file is left with fragments but no vectors, and drop
                // the now-stale record so the next run re-indexes the file.
                self.rollback_file(&outcome.path_str);
                return Err(self.fatal(err, "storage failed", started, failed_files));
            }
            committed.push(outcome);
        }

        Ok(committed)
    }

    /// Best-effort cleanup after a failed per-file commit: evicts the
    /// file's fragments, vectors, and modification record. Failures here
    /// are logged, not propagated; the commit error is the one surfaced.
    fn rollback_file(&self, path: &str) {
        if let Err(err) = self.store.remove_by_file(path) {
            warn!(path, error = %err, "rollback of fragment store failed");
        }
        if let Err(err) = self.index.delete_by_file(path) {
            warn!(path, error = %err, "rollback of vector index failed");
        }
        if let Err(err) = self.store.remove_modification_record(path) {
            warn!(path, error = %err, "rollback of modification record failed");
        }
    }

    /// Wraps a fatal error with the progress committed so far.
    fn fatal(
        &self,
        err: Error,
        stage: &str,
        started: Instant,
        failed_files: &[FailedFile],
    ) -> Error {
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = started.elapsed().as_millis() as u64;
        IndexingFailed {
            reason: format!("{stage}: {err}"),
            partial: Box::new(IndexReport {
                files: 0,
                chunks: 0,
                errors: failed_files.len(),
                duration_ms,
                failed_files: failed_files.to_vec(),
                summary: format!("aborted: {stage}"),
            }),
        }
        .into()
    }
}

/// Digest over the committed fragment ids, stored on the modification
/// record for safer change detection.
fn checksum_of(fragments: &[Fragment]) -> String {
    let mut buf = Vec::new();
    for fragment in fragments {
        buf.extend_from_slice(fragment.id.as_bytes());
    }
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(&buf))
}
