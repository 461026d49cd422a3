use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors. Transient fetch failures are not errors; they are recorded
/// in the pass report and retried by the next pass.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("{document} schema changed? {reason}")]
    Schema { document: String, reason: String },

    #[error("index {url} unavailable ({reason}) and no cached copy to fall back on")]
    IndexUnavailable { url: String, reason: String },

    #[error("no committed index at '{}'", .0.display())]
    NoCommittedIndex(PathBuf),

    #[error("mirror still inconsistent after {passes} passes")]
    PassLimitExceeded { passes: u32 },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ledger(#[from] pkgmirror_ledger::LedgerError),

    #[error(transparent)]
    Fs(#[from] pkgmirror_fs::Error),

    #[error(transparent)]
    Verify(#[from] pkgmirror_verify::VerifyError),

    #[error(transparent)]
    Fetch(#[from] pkgmirror_fetch::FetchError),
}

impl MirrorError {
    pub(crate) fn schema(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            document: document.into(),
            reason:   reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
