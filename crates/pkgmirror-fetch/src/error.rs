//! Error types for pkgmirror-fetch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("max_connections must be at least 1")]
    ZeroCapacity,

    #[error("request slot pool was closed")]
    PoolClosed,

    #[cfg(feature = "reqwest")]
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[cfg(feature = "reqwest")]
    #[error("invalid proxy URL {url}: {source}")]
    Proxy {
        url:    String,
        #[source]
        source: reqwest::Error,
    },
}

pub type Result<T> = std::result::Result<T, FetchError>;
