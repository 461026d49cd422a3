//! The crawl orchestrator.
//!
//! A run is a sequence of passes. Each pass fetches the index into a staging
//! file, fills in missing shards, fills in missing leaves, then checks every
//! leaf the staged shards reference. The staged index is promoted only after a
//! pass that saw no failed fetch and no bad leaf.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pkgmirror_fetch::{BoundedFetcher, FetchResult, FetchTask, HttpClient};
use pkgmirror_ledger::{ExpiryLedger, ReclaimReport};
use pkgmirror_verify::{ContentVerifier, Sha256Hasher};

use crate::config::MirrorOptions;
use crate::document::{IndexDocument, LeafRef, ShardDocument, ShardRef};
use crate::error::{MirrorError, Result};
use crate::layout::CacheLayout;
use crate::publisher::{PublishOutcome, Publisher};

/// What a fetch task is for.
#[derive(Debug, Clone)]
enum Target {
    Shard(ShardRef),
    Leaf(LeafRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFetch {
    pub url:    String,
    pub status: Option<u16>,
    pub reason: String,
}

/// Result of checking every leaf referenced by a set of shards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub total:          usize,
    /// Leaves missing or with the wrong content.
    pub bad:            usize,
    /// Corrupt leaves deleted by the check.
    pub removed:        usize,
    pub missing_shards: usize,
}

impl CheckReport {
    pub fn is_consistent(&self) -> bool { self.bad == 0 && self.missing_shards == 0 }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub pass:           u32,
    /// The index could not be fetched and the cached copy was used.
    pub index_fallback: bool,
    pub shards_fetched: usize,
    pub shards_cached:  usize,
    pub leaves_fetched: usize,
    pub leaves_cached:  usize,
    pub superseded:     usize,
    pub failures:       Vec<FailedFetch>,
    pub check:          CheckReport,
}

impl PassReport {
    fn new(pass: u32) -> Self {
        Self {
            pass,
            ..Self::default()
        }
    }

    pub fn needs_retry(&self) -> bool { self.index_fallback || !self.failures.is_empty() || !self.check.is_consistent() }

    fn fail(&mut self, url: &str, status: Option<u16>, reason: String) {
        tracing::warn!(pass = self.pass, url, status, %reason, "fetch failed");
        self.failures.push(FailedFetch {
            url: url.to_string(),
            status,
            reason,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    pub passes:         u32,
    pub shards_fetched: usize,
    pub leaves_fetched: usize,
    /// Leaves referenced by the promoted index.
    pub leaves:         usize,
    pub reclaimed:      usize,
    pub finished_at:    DateTime<Utc>,
}

pub struct Mirror<C> {
    client:    Arc<C>,
    fetcher:   BoundedFetcher<C, Target>,
    publisher: Publisher,
    verifier:  ContentVerifier,
    ledger:    ExpiryLedger,
    layout:    CacheLayout,
    options:   MirrorOptions,
}

impl<C> Mirror<C>
where
    C: HttpClient + 'static,
{
    pub fn new(client: Arc<C>, layout: CacheLayout, ledger: ExpiryLedger, options: MirrorOptions) -> Self {
        Self {
            fetcher: BoundedFetcher::new(Arc::clone(&client), options.max_connections),
            publisher: Publisher::new(ledger.clone(), options.generate_gz),
            verifier: ContentVerifier::new(),
            client,
            ledger,
            layout,
            options,
        }
    }

    pub fn layout(&self) -> &CacheLayout { &self.layout }

    pub fn ledger(&self) -> &ExpiryLedger { &self.ledger }

    pub async fn run(&mut self) -> Result<MirrorReport> { self.run_at(Utc::now()).await }

    /// Run passes until the mirror is consistent, then promote the staged index.
    ///
    /// `now` is the timestamp recorded for every file superseded during the run
    /// and the reference point for reclaiming expired ones.
    pub async fn run_at(&mut self, now: DateTime<Utc>) -> Result<MirrorReport> {
        let mut reclaimed = self.reclaim_at(now)?.reclaimed.len();
        let mut shards_fetched = 0;
        let mut leaves_fetched = 0;

        for pass in 1..=self.options.max_passes.get() {
            let report = self.run_pass(pass, now).await?;
            shards_fetched += report.shards_fetched;
            leaves_fetched += report.leaves_fetched;

            if report.needs_retry() {
                tracing::warn!(
                    pass,
                    failures = report.failures.len(),
                    bad = report.check.bad,
                    missing_shards = report.check.missing_shards,
                    "mirror inconsistent, starting another pass"
                );
                continue;
            }

            let orphaned = self.queue_orphaned_leaves(&self.staged_index()?, now)?;
            if orphaned > 0 {
                tracing::info!(orphaned, "queued leaves of dropped packages");
            }
            self.publisher
                .promote_index(&self.layout.staging_index_path(), &self.layout.index_path())?;
            reclaimed += self.reclaim_at(now)?.reclaimed.len();

            tracing::info!(pass, shards_fetched, leaves_fetched, leaves = report.check.total, "mirror up to date");
            return Ok(MirrorReport {
                passes: pass,
                shards_fetched,
                leaves_fetched,
                leaves: report.check.total,
                reclaimed,
                finished_at: Utc::now(),
            });
        }

        Err(MirrorError::PassLimitExceeded {
            passes: self.options.max_passes.get(),
        })
    }

    /// One full walk: index, shards, leaves, then the consistency check.
    pub async fn run_pass(&mut self, pass: u32, now: DateTime<Utc>) -> Result<PassReport> {
        let mut report = PassReport::new(pass);
        tracing::info!(pass, "starting pass");

        let index = self.fetch_index(&mut report).await?;
        self.fetch_shards(&index, now, &mut report).await?;
        self.fetch_leaves(&index, now, &mut report).await?;

        report.check = self.check_index(&self.staged_index()?)?;

        tracing::info!(
            pass,
            shards_fetched = report.shards_fetched,
            leaves_fetched = report.leaves_fetched,
            failures = report.failures.len(),
            bad = report.check.bad,
            total = report.check.total,
            "pass finished"
        );
        Ok(report)
    }

    /// Check the committed mirror without fetching anything.
    pub fn check(&self) -> Result<CheckReport> {
        let path = self.layout.index_path();
        if !path.exists() {
            return Err(MirrorError::NoCommittedIndex(path));
        }
        let index = IndexDocument::parse(&pkgmirror_fs::atomic_read(&path)?)?;
        self.check_index(&index)
    }

    /// Delete every superseded file whose grace period has elapsed.
    pub fn reclaim(&self) -> Result<ReclaimReport> { self.reclaim_at(Utc::now()) }

    fn reclaim_at(&self, now: DateTime<Utc>) -> Result<ReclaimReport> {
        let report = self.ledger.reclaim_expired(now, self.options.grace)?;
        if !report.reclaimed.is_empty() || report.failed > 0 {
            tracing::info!(
                reclaimed = report.reclaimed.len(),
                missing = report.missing,
                failed = report.failed,
                "reclaimed expired files"
            );
        }
        Ok(report)
    }

    async fn fetch_index(&mut self, report: &mut PassReport) -> Result<IndexDocument> {
        let url = self.layout.index_url();
        let staging = self.layout.staging_index_path();

        let failure = match self.client.send(&url).await {
            Ok(response) if response.is_success() => {
                let mut index = IndexDocument::parse(&response.body)?;
                index.normalize_urls(self.layout.upstream());
                self.publisher.write_staged(&staging, &index.to_bytes())?;
                tracing::debug!(url, shards = index.shards().len(), "index fetched");
                return Ok(index);
            }
            Ok(response) => (Some(response.status), format!("HTTP {}", response.status)),
            Err(e) => (None, e.to_string()),
        };

        let (status, reason) = failure;
        let canonical = self.layout.index_path();
        if !canonical.exists() {
            return Err(MirrorError::IndexUnavailable { url, reason });
        }
        report.fail(&url, status, reason);
        report.index_fallback = true;

        let bytes = pkgmirror_fs::atomic_read(&canonical)?;
        let index = IndexDocument::parse(&bytes)?;
        self.publisher.write_staged(&staging, &bytes)?;
        tracing::info!("using cached index");
        Ok(index)
    }

    async fn fetch_shards(&mut self, index: &IndexDocument, now: DateTime<Utc>, report: &mut PassReport) -> Result<()> {
        for shard in index.shards() {
            let path = self.layout.shard_path(shard);
            if path.exists() {
                report.shards_cached += 1;
                self.publisher.retain(&path)?;
                self.supersede_shard_versions(shard, now, report)?;
                continue;
            }
            let task = FetchTask::new(self.layout.shard_url(shard), Target::Shard(shard.clone()));
            self.dispatch(task, now, report).await?;
        }
        self.finish(now, report).await
    }

    async fn fetch_leaves(&mut self, index: &IndexDocument, now: DateTime<Utc>, report: &mut PassReport) -> Result<()> {
        for shard in index.shards() {
            let path = self.layout.shard_path(shard);
            if !path.exists() {
                continue;
            }
            let document = ShardDocument::load(&path)?;
            for leaf in document.leaves() {
                let path = self.layout.leaf_path(leaf);
                if path.exists() {
                    report.leaves_cached += 1;
                    if self.publisher.retain(&path)? {
                        self.supersede_leaf_versions(leaf, now, report)?;
                    }
                    continue;
                }
                let task = FetchTask::new(self.layout.leaf_url(leaf), Target::Leaf(leaf.clone()));
                self.dispatch(task, now, report).await?;
            }
        }
        self.finish(now, report).await
    }

    async fn dispatch(&mut self, task: FetchTask<Target>, now: DateTime<Utc>, report: &mut PassReport) -> Result<()> {
        if self.fetcher.is_saturated() {
            for result in self.fetcher.drain_ready().await {
                self.handle(result, now, report)?;
            }
        }
        self.fetcher.submit(task).await?;
        Ok(())
    }

    async fn finish(&mut self, now: DateTime<Utc>, report: &mut PassReport) -> Result<()> {
        for result in self.fetcher.drain_all().await {
            self.handle(result, now, report)?;
        }
        Ok(())
    }

    fn handle(&self, result: FetchResult<Target>, now: DateTime<Utc>, report: &mut PassReport) -> Result<()> {
        let url = result.task.url.as_str();
        if let Some(reason) = result.failure() {
            report.fail(url, result.status(), reason);
            return Ok(());
        }

        let canonical = match &result.task.tag {
            Target::Shard(shard) => {
                if let Some(response) = result.success() {
                    let actual = Sha256Hasher::digest(&response.body);
                    if actual != shard.hash {
                        report.fail(url, Some(response.status), format!("content hash {actual} does not match"));
                        return Ok(());
                    }
                    ShardDocument::parse(&shard.relative_path(), &response.body)?;
                }
                self.supersede_shard_versions(shard, now, report)?;
                self.layout.shard_path(shard)
            }
            Target::Leaf(leaf) => {
                self.supersede_leaf_versions(leaf, now, report)?;
                self.layout.leaf_path(leaf)
            }
        };

        match self.publisher.publish(&result, &canonical)? {
            PublishOutcome::Published => match result.task.tag {
                Target::Shard(_) => report.shards_fetched += 1,
                Target::Leaf(_) => report.leaves_fetched += 1,
            },
            PublishOutcome::NeedsRetry { reason } => report.fail(url, result.status(), reason),
        }
        Ok(())
    }

    fn staged_index(&self) -> Result<IndexDocument> {
        IndexDocument::parse(&pkgmirror_fs::atomic_read(self.layout.staging_index_path())?)
    }

    /// Queue older generations of `shard` and remember them so the packages
    /// they list can be compared against the next consistent index.
    fn supersede_shard_versions(&self, shard: &ShardRef, now: DateTime<Utc>, report: &mut PassReport) -> Result<()> {
        let previous = self.layout.previous_shard_versions(shard)?;
        for path in self.publisher.supersede(&previous, now)? {
            report.superseded += 1;
            if path.extension().is_some_and(|ext| ext == "gz") {
                continue;
            }
            self.ledger.mark_retired(&path)?;
        }
        Ok(())
    }

    fn supersede_leaf_versions(&self, leaf: &LeafRef, now: DateTime<Utc>, report: &mut PassReport) -> Result<()> {
        let previous = self.layout.previous_leaf_versions(leaf)?;
        report.superseded += self.publisher.supersede(&previous, now)?.len();
        Ok(())
    }

    /// Queue the leaves of packages that a retired shard listed but no shard
    /// of `index` references any more. Returns how many files were queued.
    fn queue_orphaned_leaves(&self, index: &IndexDocument, now: DateTime<Utc>) -> Result<usize> {
        let retired = self.ledger.retired()?;
        if retired.is_empty() {
            return Ok(0);
        }

        let mut live = HashSet::new();
        for shard in index.shards() {
            let path = self.layout.shard_path(shard);
            for leaf in ShardDocument::load(&path)?.leaves() {
                live.insert(self.layout.leaf_path(leaf));
            }
            live.insert(path);
        }

        let mut queued = 0;
        for old in retired {
            if !live.contains(&old) && old.exists() {
                match ShardDocument::load(&old) {
                    Ok(document) => {
                        for leaf in document.leaves() {
                            let path = self.layout.leaf_path(leaf);
                            if live.contains(&path) {
                                continue;
                            }
                            let stale: Vec<PathBuf> = [pkgmirror_fs::gz_path(&path), path]
                                .into_iter()
                                .filter(|p| p.exists())
                                .collect();
                            queued += self.publisher.supersede(&stale, now)?.len();
                        }
                    }
                    Err(e) => tracing::warn!(shard = %old.display(), error = %e, "retired shard unreadable, its leaves stay"),
                }
            }
            self.ledger.clear_retired(&old)?;
        }
        Ok(queued)
    }

    /// Verify every leaf the shards of `index` reference, deleting corrupt ones.
    pub fn check_index(&self, index: &IndexDocument) -> Result<CheckReport> {
        let mut report = CheckReport::default();
        for shard in index.shards() {
            let path = self.layout.shard_path(shard);
            if !path.exists() {
                tracing::warn!(shard = %path.display(), "shard missing");
                report.missing_shards += 1;
                continue;
            }
            for leaf in ShardDocument::load(&path)?.leaves() {
                report.total += 1;
                let path = self.layout.leaf_path(leaf);
                if self.verifier.is_fresh(&path, &leaf.hash)? {
                    continue;
                }
                report.bad += 1;
                if pkgmirror_fs::remove_with_gz(&path)? {
                    tracing::warn!(path = %path.display(), "removed corrupt leaf");
                    report.removed += 1;
                }
            }
        }
        tracing::info!(bad = report.bad, total = report.total, missing_shards = report.missing_shards, "consistency check");
        Ok(report)
    }
}
