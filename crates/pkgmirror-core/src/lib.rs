//! Incremental mirroring of a hierarchical package-metadata repository.
//!
//! The repository is a three-level graph: an index (`packages.json`) lists
//! shard files by content hash, and each shard lists one leaf file per
//! package, again by content hash. [`Mirror`] walks that graph, fetches what
//! the local cache lacks through a bounded pool of requests, and promotes the
//! new index only once every referenced file is present and verified.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pkgmirror_core::{CacheLayout, Mirror, MirrorConfig};
//! use pkgmirror_fetch::{ClientSettings, ReqwestClient};
//! use pkgmirror_ledger::ExpiryLedger;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MirrorConfig::default();
//! let client = Arc::new(ReqwestClient::new(ClientSettings::default())?);
//! let layout = CacheLayout::new(&config.cache_dir, &config.upstream_url);
//! let ledger = ExpiryLedger::open(&config.expired_db)?;
//!
//! let mut mirror = Mirror::new(client, layout, ledger, config.mirror_options()?);
//! let report = mirror.run().await?;
//! println!("{} leaves after {} passes", report.leaves, report.passes);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod layout;
pub mod mirror;
pub mod publisher;

pub use config::{MirrorConfig, MirrorOptions};
pub use document::{IndexDocument, LeafRef, ShardDocument, ShardRef};
pub use error::{ConfigError, MirrorError, Result};
pub use layout::CacheLayout;
pub use mirror::{CheckReport, FailedFetch, Mirror, MirrorReport, PassReport};
pub use publisher::{PublishOutcome, Publisher};
