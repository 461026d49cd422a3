//! Typed views of the three document levels.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use pkgmirror_verify::ContentHash;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{MirrorError, Result};

/// Placeholder substituted with a content hash in shard templates.
pub const HASH_TOKEN: &str = "%hash%";

/// Index fields that may be root-relative upstream and are rewritten absolute.
pub const AUX_URL_FIELDS: [&str; 3] = ["notify", "notify-batch", "search"];

const INDEX: &str = "packages.json";

#[derive(Debug, Deserialize)]
struct HashEntry {
    sha256: ContentHash,
}

/// A `provider-includes` entry: a path template bound to the hash of its current generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRef {
    pub template: String,
    pub hash:     ContentHash,
}

impl ShardRef {
    /// Path relative to the mirror root, e.g. `p/provider-2013$<hex>.json`.
    pub fn relative_path(&self) -> String { self.template.replace(HASH_TOKEN, &self.hash.to_hex()) }

    /// The directory part of the template, the literal file-name prefix before
    /// the hash token and the suffix after it.
    pub fn template_parts(&self) -> (&str, &str, &str) {
        let (before, suffix) = self.template.split_once(HASH_TOKEN).unwrap_or((self.template.as_str(), ""));
        match before.rsplit_once('/') {
            Some((dir, prefix)) => (dir, prefix, suffix),
            None => ("", before, suffix),
        }
    }
}

/// The root index document.
///
/// Only `provider-includes` is interpreted; every other field is kept verbatim
/// and written back by [`IndexDocument::to_bytes`].
#[derive(Debug, Clone)]
pub struct IndexDocument {
    raw:    Map<String, Value>,
    shards: Vec<ShardRef>,
}

impl IndexDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| MirrorError::schema(INDEX, e.to_string()))?;
        let Value::Object(raw) = value else {
            return Err(MirrorError::schema(INDEX, "top level is not an object"));
        };

        let includes = raw
            .get("provider-includes")
            .cloned()
            .ok_or_else(|| MirrorError::schema(INDEX, "missing provider-includes"))?;
        let includes: BTreeMap<String, HashEntry> = serde_json::from_value(includes)
            .map_err(|e| MirrorError::schema(INDEX, format!("provider-includes: {e}")))?;
        if includes.is_empty() {
            return Err(MirrorError::schema(INDEX, "provider-includes is empty"));
        }

        let mut shards = Vec::with_capacity(includes.len());
        for (template, entry) in includes {
            validate_template(&template)?;
            shards.push(ShardRef {
                template,
                hash: entry.sha256,
            });
        }

        Ok(Self { raw, shards })
    }

    pub fn shards(&self) -> &[ShardRef] { &self.shards }

    pub fn get(&self, field: &str) -> Option<&Value> { self.raw.get(field) }

    /// Prefix root-relative auxiliary URLs with `origin`.
    pub fn normalize_urls(&mut self, origin: &str) {
        let origin = origin.trim_end_matches('/');
        for field in AUX_URL_FIELDS {
            if let Some(Value::String(url)) = self.raw.get_mut(field)
                && url.starts_with('/')
                && !url.starts_with("//")
            {
                *url = format!("{origin}{url}");
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing a `Map` of plain JSON values cannot fail.
        serde_json::to_vec(&self.raw).unwrap_or_default()
    }
}

fn validate_template(template: &str) -> Result<()> {
    let reject = |reason: &str| -> Result<()> {
        Err(MirrorError::schema(INDEX, format!("shard template '{template}' {reason}")))
    };

    if template.matches(HASH_TOKEN).count() != 1 {
        return reject("must contain exactly one %hash%");
    }
    let (_, suffix) = template.split_once(HASH_TOKEN).unwrap_or_default();
    if suffix.contains('/') {
        return reject("must keep %hash% in the file name");
    }
    if !is_relative_safe(template) {
        return reject("escapes the mirror root");
    }
    Ok(())
}

/// A path that stays below the directory it is joined onto.
pub(crate) fn is_relative_safe(path: &str) -> bool {
    !path.is_empty()
        && !path.contains('\\')
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// A package and the hash of its current leaf file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafRef {
    pub package: String,
    pub hash:    ContentHash,
}

impl LeafRef {
    /// `p/<package>$<hex>.json`
    pub fn relative_path(&self) -> String { format!("p/{}${}.json", self.package, self.hash) }
}

#[derive(Debug, Deserialize)]
struct RawShard {
    providers: BTreeMap<String, HashEntry>,
}

/// A shard: the package → leaf hash table for one slice of the repository.
#[derive(Debug, Clone)]
pub struct ShardDocument {
    leaves: Vec<LeafRef>,
}

impl ShardDocument {
    /// `name` identifies the shard in error messages.
    pub fn parse(name: &str, bytes: &[u8]) -> Result<Self> {
        let raw: RawShard = serde_json::from_slice(bytes).map_err(|e| MirrorError::schema(name, e.to_string()))?;
        if raw.providers.is_empty() {
            return Err(MirrorError::schema(name, "providers is empty"));
        }

        let mut leaves = Vec::with_capacity(raw.providers.len());
        for (package, entry) in raw.providers {
            if !is_relative_safe(&package) || package.contains('$') {
                tracing::warn!(shard = name, %package, "skipping package with unusable name");
                continue;
            }
            leaves.push(LeafRef {
                package,
                hash: entry.sha256,
            });
        }
        Ok(Self { leaves })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = pkgmirror_fs::atomic_read(path)?;
        Self::parse(&path.display().to_string(), &bytes)
    }

    pub fn leaves(&self) -> &[LeafRef] { &self.leaves }

    pub fn len(&self) -> usize { self.leaves.len() }

    pub fn is_empty(&self) -> bool { self.leaves.is_empty() }
}
