//! Filesystem primitives for the mirror cache.
//!
//! - `primitives/` - atomic writes and renames, gzip siblings, tolerant removal
//! - `versions.rs` - discovery of previous generations of a templated path

mod error;
mod primitives;
mod versions;

pub use error::{Error, Result};
pub use primitives::{
    AtomicWriteOptions, atomic_read, atomic_rename, atomic_write, gz_path, gzip_bytes, remove_if_exists,
    remove_with_gz, write_gz_sibling,
};
pub use versions::{VersionedFile, scan_versions};
