use std::path::{Path, PathBuf};

use pkgmirror_verify::ContentHash;

use crate::document::{LeafRef, ShardRef};
use crate::error::Result;

pub const INDEX_FILE: &str = "packages.json";
pub const STAGING_SUFFIX: &str = ".new";

/// Maps documents to cache paths under `root` and to URLs under `upstream`.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root:     PathBuf,
    upstream: String,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>, upstream: impl Into<String>) -> Self {
        let upstream = upstream.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            upstream,
        }
    }

    pub fn root(&self) -> &Path { &self.root }

    /// Upstream base URL without a trailing slash.
    pub fn upstream(&self) -> &str { &self.upstream }

    pub fn index_path(&self) -> PathBuf { self.root.join(INDEX_FILE) }

    pub fn staging_index_path(&self) -> PathBuf { self.root.join(format!("{INDEX_FILE}{STAGING_SUFFIX}")) }

    pub fn index_url(&self) -> String { self.url(INDEX_FILE) }

    pub fn shard_path(&self, shard: &ShardRef) -> PathBuf { self.root.join(shard.relative_path()) }

    pub fn shard_url(&self, shard: &ShardRef) -> String { self.url(&shard.relative_path()) }

    pub fn leaf_path(&self, leaf: &LeafRef) -> PathBuf { self.root.join(leaf.relative_path()) }

    pub fn leaf_url(&self, leaf: &LeafRef) -> String { self.url(&leaf.relative_path()) }

    /// Every other generation of `shard`'s template on disk, plain and compressed.
    pub fn previous_shard_versions(&self, shard: &ShardRef) -> Result<Vec<PathBuf>> {
        let (dir, prefix, suffix) = shard.template_parts();
        self.previous_versions(&self.root.join(dir), prefix, suffix, &shard.hash)
    }

    /// Every other generation of `leaf`'s package on disk, plain and compressed.
    pub fn previous_leaf_versions(&self, leaf: &LeafRef) -> Result<Vec<PathBuf>> {
        let (dir, name) = match leaf.package.rsplit_once('/') {
            Some((dir, name)) => (self.root.join("p").join(dir), name),
            None => (self.root.join("p"), leaf.package.as_str()),
        };
        self.previous_versions(&dir, &format!("{name}$"), ".json", &leaf.hash)
    }

    fn previous_versions(&self, dir: &Path, prefix: &str, suffix: &str, current: &ContentHash) -> Result<Vec<PathBuf>> {
        let current = current.to_hex();
        Ok(pkgmirror_fs::scan_versions(dir, prefix, suffix)?
            .into_iter()
            .filter(|file| ContentHash::is_hex_digest(&file.token) && !file.token.eq_ignore_ascii_case(&current))
            .map(|file| file.path)
            .collect())
    }

    fn url(&self, relative: &str) -> String { format!("{}/{relative}", self.upstream) }
}
