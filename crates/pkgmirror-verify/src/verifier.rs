use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::{ContentHash, Result, Sha256Hasher, VerifiedReader, VerifyError};

/// Decides whether a cached file can be trusted for an expected digest.
///
/// The verifier never deletes anything; callers treat a stale file as absent
/// and decide what to do with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentVerifier;

impl ContentVerifier {
    pub fn new() -> Self { Self }

    /// `Ok(false)` when `path` is missing or hashes to something else.
    pub fn is_fresh(&self, path: &Path, expected: &ContentHash) -> Result<bool> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(VerifyError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut reader = VerifiedReader::new(BufReader::new(file), Sha256Hasher::new());
        reader.drain().map_err(|source| VerifyError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        match reader.finish(expected) {
            Ok(()) => Ok(true),
            Err(VerifyError::HashMismatch { actual, .. }) => {
                tracing::debug!(path = %path.display(), %expected, %actual, "content hash mismatch");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn hash_file(&self, path: &Path) -> Result<ContentHash> {
        let file = File::open(path).map_err(|source| VerifyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = VerifiedReader::new(BufReader::new(file), Sha256Hasher::new());
        reader.drain().map_err(|source| VerifyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(reader.digest())
    }
}
