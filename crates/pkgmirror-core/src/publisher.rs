use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pkgmirror_fetch::FetchResult;
use pkgmirror_fs::AtomicWriteOptions;
use pkgmirror_ledger::ExpiryLedger;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    NeedsRetry { reason: String },
}

/// Writes fetched documents into the cache and hands old generations to the ledger.
#[derive(Clone)]
pub struct Publisher {
    ledger:      ExpiryLedger,
    generate_gz: bool,
}

impl Publisher {
    pub fn new(ledger: ExpiryLedger, generate_gz: bool) -> Self { Self { ledger, generate_gz } }

    fn options() -> AtomicWriteOptions { AtomicWriteOptions::new().create_dirs(true) }

    /// Store a successful response at `canonical`; anything else is left for the next pass.
    pub fn publish<T>(&self, result: &FetchResult<T>, canonical: &Path) -> Result<PublishOutcome> {
        let Some(response) = result.success() else {
            let reason = result.failure().unwrap_or_else(|| "no response".to_string());
            return Ok(PublishOutcome::NeedsRetry { reason });
        };
        self.write(canonical, &response.body)?;
        self.retain(canonical)?;
        tracing::debug!(path = %canonical.display(), bytes = response.body.len(), "published");
        Ok(PublishOutcome::Published)
    }

    /// Atomically write `content` and, if enabled, its `.gz` sibling.
    pub fn write(&self, canonical: &Path, content: &[u8]) -> Result<()> {
        pkgmirror_fs::atomic_write(canonical, content, Self::options())?;
        if self.generate_gz {
            pkgmirror_fs::write_gz_sibling(canonical, content, Self::options())?;
        }
        Ok(())
    }

    /// Write the index of the pass in progress. It has no `.gz` sibling until promoted.
    pub fn write_staged(&self, staging: &Path, content: &[u8]) -> Result<()> {
        pkgmirror_fs::atomic_write(staging, content, Self::options())?;
        Ok(())
    }

    /// Queue `previous` for expiry. Returns the paths that were newly registered.
    pub fn supersede(&self, previous: &[PathBuf], now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
        let mut registered = Vec::new();
        for path in previous {
            if self.ledger.register(path, now)? {
                tracing::debug!(path = %path.display(), "superseded");
                registered.push(path.clone());
            }
        }
        Ok(registered)
    }

    /// Take `current` and its `.gz` sibling off the expiry ledger.
    ///
    /// A content-addressed file can become current again after it was
    /// superseded. Returns whether either record existed.
    pub fn retain(&self, current: &Path) -> Result<bool> {
        let plain = self.ledger.forget(current)?;
        let gz = self.ledger.forget(&pkgmirror_fs::gz_path(current))?;
        Ok(plain || gz)
    }

    /// Commit a staged index. The gzip sibling is always rebuilt from the
    /// canonical content so it cannot describe an older generation.
    pub fn promote_index(&self, staging: &Path, canonical: &Path) -> Result<()> {
        pkgmirror_fs::atomic_rename(staging, canonical)?;
        let content = pkgmirror_fs::atomic_read(canonical)?;
        pkgmirror_fs::write_gz_sibling(canonical, &content, Self::options())?;
        tracing::info!(path = %canonical.display(), "index promoted");
        Ok(())
    }
}
