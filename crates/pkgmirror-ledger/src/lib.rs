//! Persistent bookkeeping of superseded mirror files.
//!
//! When a shard or leaf is replaced by a newer generation, the old file stays
//! readable for a grace period so clients holding an older parent document can
//! still resolve it. The [`ExpiryLedger`] remembers when each file was
//! superseded and deletes it once the grace period has elapsed.

mod error;
mod ledger;
mod record;

pub use error::{LedgerError, Result};
pub use ledger::{ExpiryLedger, ReclaimReport};
pub use record::ExpiryRecord;
