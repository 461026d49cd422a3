use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::gzip::gz_path;
use crate::{Error, Result};

/// Remove `path`, returning whether it existed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Remove `path` and its `.gz` sibling. Returns whether the main file existed.
pub fn remove_with_gz(path: &Path) -> Result<bool> {
    let existed = remove_if_exists(path)?;
    remove_if_exists(&gz_path(path))?;
    Ok(existed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_remove_if_exists_tolerates_missing() {
        let dir = tempdir().unwrap();
        assert!(!remove_if_exists(&dir.path().join("gone")).unwrap());
    }

    #[test]
    fn test_remove_with_gz_removes_both() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foo.json");
        fs::write(&path, "x").unwrap();
        fs::write(gz_path(&path), "y").unwrap();

        assert!(remove_with_gz(&path).unwrap());
        assert!(!path.exists());
        assert!(!gz_path(&path).exists());
    }
}
