use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger store failure: {0}")]
    Store(#[from] sled::Error),

    #[error("failed to encode or decode ledger record: {0}")]
    Codec(#[from] postcard::Error),

    #[error("ledger record for '{0}' holds an out-of-range timestamp")]
    InvalidTimestamp(String),

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error(transparent)]
    Fs(#[from] pkgmirror_fs::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
