use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{LedgerError, Result};
use crate::record::{ExpiryRecord, StoredRecord};

const RECORDS_TREE: &str = "superseded";
const RETIRED_TREE: &str = "retired-shards";

/// Superseded files awaiting physical deletion.
///
/// Each path is tracked at most once: the first registration fixes the grace
/// clock and later registrations of the same path are ignored. Every mutation
/// is flushed before it returns. The store is single-process; callers hold an
/// external lock for the lifetime of a run.
#[derive(Clone)]
pub struct ExpiryLedger {
    db:      sled::Db,
    records: sled::Tree,
    /// Superseded shard files whose orphaned leaves have not been queued yet.
    retired: sled::Tree,
}

/// What a housekeeping sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Files deleted from disk and dropped from the ledger.
    pub reclaimed: Vec<PathBuf>,
    /// Records dropped whose file was already gone.
    pub missing:   usize,
    /// Files that could not be deleted; their records are kept for the next run.
    pub failed:    usize,
}

impl ExpiryLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        Self::from_db(db)
    }

    /// A throwaway ledger removed when dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let records = db.open_tree(RECORDS_TREE)?;
        let retired = db.open_tree(RETIRED_TREE)?;
        Ok(Self { db, records, retired })
    }

    /// Track `path` as superseded at `now`. Returns `false` if it was already tracked.
    pub fn register(&self, path: &Path, now: DateTime<Utc>) -> Result<bool> {
        let key = key_for(path)?;
        let value = postcard::to_allocvec(&StoredRecord::from_time(now))?;

        let inserted = self
            .records
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(value))?
            .is_ok();
        self.db.flush()?;

        if inserted {
            tracing::debug!(path = %key, at = %now, "registered superseded file");
        }
        Ok(inserted)
    }

    /// Stop tracking `path` without touching the file. Returns whether it was tracked.
    pub fn forget(&self, path: &Path) -> Result<bool> {
        let key = key_for(path)?;
        let removed = self.records.remove(key.as_bytes())?.is_some();
        if removed {
            self.db.flush()?;
            tracing::debug!(path = %key, "superseded file is current again");
        }
        Ok(removed)
    }

    /// Remember a superseded shard file until its dropped packages are queued.
    pub fn mark_retired(&self, shard: &Path) -> Result<bool> {
        let key = key_for(shard)?;
        let fresh = self.retired.insert(key.as_bytes(), &[] as &[u8])?.is_none();
        self.db.flush()?;
        Ok(fresh)
    }

    /// Shard files marked by [`mark_retired`](Self::mark_retired), ordered by path.
    pub fn retired(&self) -> Result<Vec<PathBuf>> {
        self.retired
            .iter()
            .keys()
            .map(|key| Ok::<_, LedgerError>(PathBuf::from(String::from_utf8_lossy(&key?).into_owned())))
            .collect()
    }

    pub fn clear_retired(&self, shard: &Path) -> Result<()> {
        let key = key_for(shard)?;
        self.retired.remove(key.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    pub fn superseded_at(&self, path: &Path) -> Result<Option<DateTime<Utc>>> {
        let key = key_for(path)?;
        match self.records.get(key.as_bytes())? {
            Some(raw) => Ok(Some(decode(&key, &raw)?.superseded_at)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, path: &Path) -> Result<bool> {
        let key = key_for(path)?;
        Ok(self.records.contains_key(key.as_bytes())?)
    }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    /// All tracked records, ordered by path.
    pub fn records(&self) -> Result<Vec<ExpiryRecord>> {
        self.records
            .iter()
            .map(|entry| {
                let (key, raw) = entry?;
                let key = String::from_utf8_lossy(&key).into_owned();
                decode(&key, &raw)
            })
            .collect()
    }

    /// Paths whose grace period has fully elapsed at `now`.
    pub fn list_expired(&self, now: DateTime<Utc>, grace: TimeDelta) -> Result<Vec<PathBuf>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|record| record.is_expired(now, grace))
            .map(|record| PathBuf::from(record.path))
            .collect())
    }

    /// Delete `path` (and its `.gz` sibling) if present, then forget it.
    ///
    /// Returns whether the file existed. A file removed out-of-band is not an
    /// error; the record is dropped either way.
    pub fn reclaim(&self, path: &Path) -> Result<bool> {
        let key = key_for(path)?;
        let existed = pkgmirror_fs::remove_with_gz(path)?;
        self.records.remove(key.as_bytes())?;
        self.db.flush()?;
        Ok(existed)
    }

    /// Reclaim everything past its grace period.
    ///
    /// Deletion failures are logged and left for the next sweep; store
    /// failures abort the sweep.
    pub fn reclaim_expired(&self, now: DateTime<Utc>, grace: TimeDelta) -> Result<ReclaimReport> {
        let mut report = ReclaimReport::default();

        for path in self.list_expired(now, grace)? {
            match self.reclaim(&path) {
                Ok(true) => report.reclaimed.push(path),
                Ok(false) => report.missing += 1,
                Err(LedgerError::Fs(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to reclaim expired file");
                    report.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            reclaimed = report.reclaimed.len(),
            missing = report.missing,
            failed = report.failed,
            remaining = self.len(),
            "expired file sweep finished"
        );
        Ok(report)
    }
}

fn key_for(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| LedgerError::NonUtf8Path(path.to_path_buf()))
}

fn decode(key: &str, raw: &[u8]) -> Result<ExpiryRecord> {
    let stored: StoredRecord = postcard::from_bytes(raw)?;
    let superseded_at = stored
        .to_time()
        .ok_or_else(|| LedgerError::InvalidTimestamp(key.to_string()))?;
    Ok(ExpiryRecord {
        path: key.to_string(),
        superseded_at,
    })
}
