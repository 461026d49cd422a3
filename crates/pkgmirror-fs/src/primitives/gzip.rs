use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

use super::atomic_write::{AtomicWriteOptions, atomic_write};
use crate::{Error, Result};

/// `<path>.gz`
pub fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

pub fn gzip_bytes(content: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(content.len() / 4), Compression::default());
    encoder.write_all(content)?;
    encoder.finish()
}

/// Atomically write the gzip-compressed form of `content` next to `path`.
pub fn write_gz_sibling(path: &Path, content: &[u8], options: AtomicWriteOptions) -> Result<PathBuf> {
    let target = gz_path(path);
    let compressed = gzip_bytes(content).map_err(|source| Error::Write {
        path: target.clone(),
        source,
    })?;
    atomic_write(&target, &compressed, options)?;
    Ok(target)
}
