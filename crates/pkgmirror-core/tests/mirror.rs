//! End-to-end crawls against an in-memory upstream repository.

use std::collections::HashMap;
use std::fs;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use pkgmirror_core::{CacheLayout, LeafRef, Mirror, MirrorError, MirrorOptions, ShardRef};
use pkgmirror_fetch::{HttpClient, HttpResponse};
use pkgmirror_ledger::ExpiryLedger;
use pkgmirror_verify::{ContentHash, Sha256Hasher};
use serde_json::json;
use tempfile::TempDir;

const BASE: &str = "https://repo.test";
const SHARD_TEMPLATE: &str = "p/provider-2013$%hash%.json";

#[derive(Debug)]
struct TestError(String);

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

impl std::error::Error for TestError {}

/// A mutable upstream that logs every request and tracks peak concurrency.
#[derive(Default)]
struct Upstream {
    routes:   Mutex<HashMap<String, (u16, Bytes)>>,
    /// Remaining 503 answers per URL before the route is served.
    flaky:    Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<String>>,
    delay:    Duration,
    active:   AtomicUsize,
    peak:     AtomicUsize,
}

impl Upstream {
    fn serve(&self, path: &str, body: impl Into<Bytes>) {
        self.routes.lock().unwrap().insert(format!("{BASE}/{path}"), (200, body.into()));
    }

    fn status(&self, path: &str, status: u16) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{BASE}/{path}"), (status, Bytes::new()));
    }

    fn flaky(&self, path: &str, failures: usize) {
        self.flaky.lock().unwrap().insert(format!("{BASE}/{path}"), failures);
    }

    fn take_requests(&self) -> Vec<String> { std::mem::take(&mut *self.requests.lock().unwrap()) }
}

impl HttpClient for Upstream {
    type Error = TestError;

    async fn send(&self, url: &str) -> Result<HttpResponse, Self::Error> {
        self.requests.lock().unwrap().push(url.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let respond = |status, body| HttpResponse {
            status,
            body,
            url: url.to_string(),
        };

        if let Some(left) = self.flaky.lock().unwrap().get_mut(url)
            && *left > 0
        {
            *left -= 1;
            return Ok(respond(503, Bytes::new()));
        }

        let route = self.routes.lock().unwrap().get(url).cloned();
        match route {
            Some((status, body)) => Ok(respond(status, body)),
            None if url.contains("unreachable") => Err(TestError("connection refused".into())),
            None => Ok(respond(404, Bytes::new())),
        }
    }
}

struct Generation {
    shard:  ShardRef,
    leaves: Vec<LeafRef>,
}

fn digest(body: &[u8]) -> ContentHash { Sha256Hasher::digest(body) }

/// Serve a complete index → shard → leaves generation.
fn publish(upstream: &Upstream, packages: &[(&str, &str)]) -> Generation {
    let mut providers = serde_json::Map::new();
    let mut leaves = Vec::new();
    for (package, body) in packages {
        let hash = digest(body.as_bytes());
        upstream.serve(&format!("p/{package}${hash}.json"), body.to_string());
        providers.insert(package.to_string(), json!({ "sha256": hash.to_hex() }));
        leaves.push(LeafRef {
            package: package.to_string(),
            hash,
        });
    }

    let shard_body = serde_json::to_vec(&json!({ "providers": providers })).unwrap();
    let shard = ShardRef {
        template: SHARD_TEMPLATE.into(),
        hash:     digest(&shard_body),
    };
    upstream.serve(&shard.relative_path(), shard_body);

    let index = serde_json::to_vec(&json!({
        "packages": [],
        "notify": "/downloads/%package%",
        "notify-batch": "/downloads/",
        "providers-url": "/p/%package%$%hash%.json",
        "provider-includes": { SHARD_TEMPLATE: { "sha256": shard.hash.to_hex() } },
    }))
    .unwrap();
    upstream.serve("packages.json", index);

    Generation { shard, leaves }
}

struct Fixture {
    dir:      TempDir,
    upstream: Arc<Upstream>,
    ledger:   ExpiryLedger,
}

impl Fixture {
    fn new() -> Self { Self::with_upstream(Upstream::default()) }

    fn with_upstream(upstream: Upstream) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ExpiryLedger::open(dir.path().join("expired.db")).unwrap();
        Self {
            dir,
            upstream: Arc::new(upstream),
            ledger,
        }
    }

    fn layout(&self) -> CacheLayout { CacheLayout::new(self.dir.path().join("cache"), BASE) }

    fn mirror(&self, max_passes: u32) -> Mirror<Upstream> {
        self.mirror_with(max_passes, 4)
    }

    fn mirror_with(&self, max_passes: u32, max_connections: usize) -> Mirror<Upstream> {
        let options = MirrorOptions {
            max_connections: NonZeroUsize::new(max_connections).unwrap(),
            max_passes:      NonZeroU32::new(max_passes).unwrap(),
            grace:           TimeDelta::hours(1),
            generate_gz:     true,
        };
        Mirror::new(Arc::clone(&self.upstream), self.layout(), self.ledger.clone(), options)
    }

    fn url(path: impl std::fmt::Display) -> String { format!("{BASE}/{path}") }
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() }

fn gz(path: &Path) -> PathBuf { pkgmirror_fs::gz_path(path) }

#[tokio::test]
async fn test_first_run_fetches_each_document_once() {
    let fx = Fixture::new();
    let generation = publish(&fx.upstream, &[("foo", r#"{"packages":{"foo":{}}}"#)]);
    let layout = fx.layout();

    let report = fx.mirror(3).run_at(t0()).await.unwrap();

    let requests = fx.upstream.take_requests();
    assert_eq!(requests, vec![
        Fixture::url("packages.json"),
        Fixture::url(generation.shard.relative_path()),
        Fixture::url(generation.leaves[0].relative_path()),
    ]);
    assert_eq!(report.passes, 1);
    assert_eq!(report.leaves, 1);
    assert_eq!((report.shards_fetched, report.leaves_fetched), (1, 1));

    assert!(layout.index_path().exists());
    assert!(gz(&layout.index_path()).exists());
    assert!(!layout.staging_index_path().exists());
    assert!(layout.shard_path(&generation.shard).exists());
    assert!(layout.leaf_path(&generation.leaves[0]).exists());
    assert!(gz(&layout.leaf_path(&generation.leaves[0])).exists());
    assert!(fx.ledger.is_empty());
}

#[tokio::test]
async fn test_promoted_index_has_absolute_aux_urls() {
    let fx = Fixture::new();
    publish(&fx.upstream, &[("foo", "{}")]);

    fx.mirror(3).run_at(t0()).await.unwrap();

    let index: serde_json::Value = serde_json::from_slice(&fs::read(fx.layout().index_path()).unwrap()).unwrap();
    assert_eq!(index["notify"], "https://repo.test/downloads/%package%");
    assert_eq!(index["notify-batch"], "https://repo.test/downloads/");
    assert_eq!(index["providers-url"], "/p/%package%$%hash%.json");
}

#[tokio::test]
async fn test_new_generation_supersedes_old_files() {
    let fx = Fixture::new();
    let layout = fx.layout();
    let first = publish(&fx.upstream, &[("foo", r#"{"v":1}"#)]);
    fx.mirror(3).run_at(t0()).await.unwrap();
    fx.upstream.take_requests();

    let second = publish(&fx.upstream, &[("foo", r#"{"v":2}"#)]);
    let t1 = t0() + TimeDelta::minutes(5);
    fx.mirror(3).run_at(t1).await.unwrap();

    let requests = fx.upstream.take_requests();
    assert_eq!(requests, vec![
        Fixture::url("packages.json"),
        Fixture::url(second.shard.relative_path()),
        Fixture::url(second.leaves[0].relative_path()),
    ]);

    let old_shard = layout.shard_path(&first.shard);
    let old_leaf = layout.leaf_path(&first.leaves[0]);
    for path in [&old_shard, &gz(&old_shard), &old_leaf, &gz(&old_leaf)] {
        assert_eq!(fx.ledger.superseded_at(path).unwrap(), Some(t1), "{}", path.display());
        assert!(path.exists(), "{} removed before its grace period", path.display());
    }
    assert_eq!(fx.ledger.len(), 4);
    assert!(layout.leaf_path(&second.leaves[0]).exists());
}

#[tokio::test]
async fn test_reverted_generation_is_taken_off_the_ledger() {
    let fx = Fixture::new();
    let layout = fx.layout();
    let a = publish(&fx.upstream, &[("foo", r#"{"v":1}"#)]);
    fx.mirror(3).run_at(t0()).await.unwrap();
    let b = publish(&fx.upstream, &[("foo", r#"{"v":2}"#)]);
    fx.mirror(3).run_at(t0() + TimeDelta::minutes(1)).await.unwrap();
    publish(&fx.upstream, &[("foo", r#"{"v":1}"#)]);
    let t2 = t0() + TimeDelta::minutes(2);
    fx.upstream.take_requests();

    let report = fx.mirror(3).run_at(t2).await.unwrap();

    assert_eq!(fx.upstream.take_requests(), vec![Fixture::url("packages.json")]);
    assert_eq!((report.shards_fetched, report.leaves_fetched), (0, 0));

    let live_shard = layout.shard_path(&a.shard);
    let live_leaf = layout.leaf_path(&a.leaves[0]);
    for path in [&live_shard, &gz(&live_shard), &live_leaf, &gz(&live_leaf)] {
        assert!(!fx.ledger.contains(path).unwrap(), "{} still queued", path.display());
    }
    let old_shard = layout.shard_path(&b.shard);
    let old_leaf = layout.leaf_path(&b.leaves[0]);
    for path in [&old_shard, &gz(&old_shard), &old_leaf, &gz(&old_leaf)] {
        assert!(fx.ledger.contains(path).unwrap(), "{} not queued", path.display());
    }

    fx.ledger.reclaim_expired(t2 + TimeDelta::hours(2), TimeDelta::hours(1)).unwrap();

    assert!(live_shard.exists());
    assert!(live_leaf.exists());
    assert!(!old_shard.exists());
    assert!(!old_leaf.exists());
    assert!(fx.mirror(1).check().unwrap().is_consistent());
}

#[tokio::test]
async fn test_dropped_package_leaves_are_queued() {
    let fx = Fixture::new();
    let layout = fx.layout();
    let first = publish(&fx.upstream, &[("foo", "{}"), ("bar", r#"{"bar":1}"#)]);
    fx.mirror(3).run_at(t0()).await.unwrap();
    let bar = layout.leaf_path(&first.leaves[1]);

    let second = publish(&fx.upstream, &[("foo", "{}")]);
    let t1 = t0() + TimeDelta::minutes(5);
    fx.mirror(3).run_at(t1).await.unwrap();

    for path in [&bar, &gz(&bar)] {
        assert_eq!(fx.ledger.superseded_at(path).unwrap(), Some(t1), "{}", path.display());
        assert!(path.exists());
    }
    let foo = layout.leaf_path(&second.leaves[0]);
    assert_eq!(foo, layout.leaf_path(&first.leaves[0]));
    assert!(!fx.ledger.contains(&foo).unwrap());
    assert!(fx.ledger.retired().unwrap().is_empty());

    let report = fx.mirror(3).run_at(t1 + TimeDelta::hours(2)).await.unwrap();

    assert!(!bar.exists());
    assert!(!gz(&bar).exists());
    assert!(foo.exists());
    // the old shard and bar, each with its .gz sibling
    assert_eq!(report.reclaimed, 2);
    assert!(fx.ledger.is_empty());
}

#[tokio::test]
async fn test_rerun_on_consistent_mirror_fetches_only_the_index() {
    let fx = Fixture::new();
    publish(&fx.upstream, &[("foo", "{}"), ("bar/baz", "{}")]);
    fx.mirror(3).run_at(t0()).await.unwrap();
    fx.upstream.take_requests();
    let ledger_before = fx.ledger.records().unwrap();

    let report = fx.mirror(3).run_at(t0() + TimeDelta::minutes(1)).await.unwrap();

    assert_eq!(fx.upstream.take_requests(), vec![Fixture::url("packages.json")]);
    assert_eq!((report.shards_fetched, report.leaves_fetched), (0, 0));
    assert_eq!(report.leaves, 2);
    assert_eq!(fx.ledger.records().unwrap(), ledger_before);
}

#[tokio::test]
async fn test_transient_failure_is_retried_in_next_pass() {
    let fx = Fixture::new();
    let generation = publish(&fx.upstream, &[("foo", "{}")]);
    fx.upstream.flaky(&generation.leaves[0].relative_path(), 1);

    let report = fx.mirror(3).run_at(t0()).await.unwrap();

    assert_eq!(report.passes, 2);
    assert_eq!(report.leaves_fetched, 1);
    assert!(fx.layout().leaf_path(&generation.leaves[0]).exists());
}

#[tokio::test]
async fn test_run_pass_reports_failures() {
    let fx = Fixture::new();
    let generation = publish(&fx.upstream, &[("foo", "{}"), ("gone", "{}")]);
    fx.upstream.status(&generation.leaves[1].relative_path(), 404);

    let report = fx.mirror(3).run_pass(1, t0()).await.unwrap();

    assert!(report.needs_retry());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].status, Some(404));
    assert_eq!(report.check.total, 2);
    assert_eq!(report.check.bad, 1);
    assert!(!fx.layout().index_path().exists());
}

#[tokio::test]
async fn test_pass_limit_keeps_previous_generation() {
    let fx = Fixture::new();
    let layout = fx.layout();
    publish(&fx.upstream, &[("foo", r#"{"v":1}"#)]);
    fx.mirror(3).run_at(t0()).await.unwrap();
    let committed = fs::read(layout.index_path()).unwrap();

    let second = publish(&fx.upstream, &[("foo", r#"{"v":2}"#)]);
    fx.upstream.status(&second.leaves[0].relative_path(), 500);
    fx.upstream.take_requests();

    let err = fx.mirror(2).run_at(t0() + TimeDelta::minutes(1)).await.unwrap_err();

    assert!(matches!(err, MirrorError::PassLimitExceeded { passes: 2 }));
    let leaf_url = Fixture::url(second.leaves[0].relative_path());
    let attempts = fx.upstream.take_requests().into_iter().filter(|u| *u == leaf_url).count();
    assert_eq!(attempts, 2);
    assert_eq!(fs::read(layout.index_path()).unwrap(), committed);
    assert!(layout.staging_index_path().exists());
}

#[tokio::test]
async fn test_corrupt_leaf_is_deleted_and_refetched() {
    let fx = Fixture::new();
    let layout = fx.layout();
    let body = r#"{"packages":{"foo":{"1.0.0":{}}}}"#;
    let generation = publish(&fx.upstream, &[("foo", body)]);
    fx.mirror(3).run_at(t0()).await.unwrap();

    let leaf = layout.leaf_path(&generation.leaves[0]);
    fs::write(&leaf, b"tampered").unwrap();
    fx.upstream.take_requests();

    let report = fx.mirror(3).run_at(t0()).await.unwrap();

    assert_eq!(report.passes, 2);
    assert_eq!(fs::read_to_string(&leaf).unwrap(), body);
    let requests = fx.upstream.take_requests();
    assert_eq!(requests.iter().filter(|u| u.ends_with(".json") && u.contains("/p/foo$")).count(), 1);
}

#[tokio::test]
async fn test_check_reports_committed_mirror() {
    let fx = Fixture::new();
    let layout = fx.layout();
    let generation = publish(&fx.upstream, &[("foo", "{}"), ("bar", "[]")]);
    let mirror = fx.mirror(3);
    assert!(matches!(mirror.check(), Err(MirrorError::NoCommittedIndex(_))));

    let mut mirror = mirror;
    mirror.run_at(t0()).await.unwrap();
    let clean = mirror.check().unwrap();
    assert!(clean.is_consistent());
    assert_eq!(clean.total, 2);

    fs::write(layout.leaf_path(&generation.leaves[1]), b"garbage").unwrap();
    let dirty = mirror.check().unwrap();
    assert_eq!((dirty.bad, dirty.removed), (1, 1));
    assert!(!layout.leaf_path(&generation.leaves[1]).exists());
}

#[tokio::test]
async fn test_shard_hash_mismatch_is_not_published() {
    let fx = Fixture::new();
    let generation = publish(&fx.upstream, &[("foo", "{}")]);
    fx.upstream
        .serve(&generation.shard.relative_path(), r#"{"providers":{"evil":{"sha256":"00"}}}"#);

    let err = fx.mirror(2).run_at(t0()).await.unwrap_err();

    assert!(matches!(err, MirrorError::PassLimitExceeded { .. }));
    assert!(!fx.layout().shard_path(&generation.shard).exists());
    assert!(!fx.layout().index_path().exists());
}

#[tokio::test]
async fn test_index_failure_without_cache_is_fatal() {
    let fx = Fixture::new();
    fx.upstream.status("packages.json", 503);

    let err = fx.mirror(3).run_at(t0()).await.unwrap_err();
    assert!(matches!(err, MirrorError::IndexUnavailable { .. }));
}

#[tokio::test]
async fn test_index_failure_falls_back_to_cached_index() {
    let fx = Fixture::new();
    let layout = fx.layout();
    publish(&fx.upstream, &[("foo", "{}")]);
    fx.mirror(3).run_at(t0()).await.unwrap();
    let committed = fs::read(layout.index_path()).unwrap();

    fx.upstream.flaky("packages.json", 1);
    let report = fx.mirror(3).run_at(t0()).await.unwrap();

    assert_eq!(report.passes, 2);
    assert_eq!(fs::read(layout.index_path()).unwrap(), committed);
}

#[tokio::test]
async fn test_schema_change_is_fatal() {
    let fx = Fixture::new();
    fx.upstream.serve("packages.json", r#"{"packages": []}"#);

    let err = fx.mirror(3).run_at(t0()).await.unwrap_err();

    assert!(matches!(err, MirrorError::Schema { .. }));
    assert!(!fx.layout().index_path().exists());
}

#[tokio::test]
async fn test_expired_files_reclaimed_after_grace() {
    let fx = Fixture::new();
    let layout = fx.layout();
    let first = publish(&fx.upstream, &[("foo", r#"{"v":1}"#)]);
    fx.mirror(3).run_at(t0()).await.unwrap();
    publish(&fx.upstream, &[("foo", r#"{"v":2}"#)]);
    fx.mirror(3).run_at(t0()).await.unwrap();

    let old_leaf = layout.leaf_path(&first.leaves[0]);
    let early = fx.mirror(3).run_at(t0() + TimeDelta::minutes(59)).await.unwrap();
    assert_eq!(early.reclaimed, 0);
    assert!(old_leaf.exists());

    let late = fx.mirror(3).run_at(t0() + TimeDelta::hours(1)).await.unwrap();
    // each plain record takes its .gz sibling along
    assert_eq!(late.reclaimed, 2);
    assert!(!old_leaf.exists());
    assert!(!gz(&old_leaf).exists());
    assert!(!layout.shard_path(&first.shard).exists());
    assert!(fx.ledger.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leaf_fetches_respect_connection_limit() {
    let fx = Fixture::with_upstream(Upstream {
        delay: Duration::from_millis(10),
        ..Upstream::default()
    });
    let names: Vec<String> = (0..20).map(|i| format!("vendor/pkg{i}")).collect();
    let packages: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "{}")).collect();
    publish(&fx.upstream, &packages);

    let report = fx.mirror_with(3, 3).run_at(t0()).await.unwrap();

    assert_eq!(report.leaves_fetched, 20);
    let peak = fx.upstream.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeded the limit");
    assert!(peak >= 2);
}
