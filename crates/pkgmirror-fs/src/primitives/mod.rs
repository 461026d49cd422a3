pub mod atomic_write;
pub mod gzip;
pub mod remove;

pub use atomic_write::{AtomicWriteOptions, atomic_read, atomic_rename, atomic_write};
pub use gzip::{gz_path, gzip_bytes, write_gz_sibling};
pub use remove::{remove_if_exists, remove_with_gz};
