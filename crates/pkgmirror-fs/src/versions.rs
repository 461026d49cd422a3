//! Discovery of sibling files that differ only by a variable token.
//!
//! Cache paths are rendered from templates such as `p/vendor/pkg$%hash%.json`.
//! Every generation of a template lives in the same directory and shares the
//! same prefix and suffix around the token, optionally followed by `.gz`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedFile {
    pub path:       PathBuf,
    pub token:      String,
    pub compressed: bool,
}

/// List files in `dir` named `<prefix><token><suffix>` or `<prefix><token><suffix>.gz`.
///
/// A missing directory yields no files. Results are sorted by path.
pub fn scan_versions(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<VersionedFile>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(Error::ReadDir {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(rest) = name.strip_prefix(prefix) else { continue };

        let (rest, compressed) = match rest.strip_suffix(".gz") {
            Some(inner) if inner.ends_with(suffix) => (inner, true),
            _ => (rest, false),
        };
        let Some(token) = rest.strip_suffix(suffix) else { continue };
        if token.is_empty() {
            continue;
        }

        found.push(VersionedFile {
            path: entry.path(),
            token: token.to_string(),
            compressed,
        });
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}
