use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// On-disk value stored under each tracked path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    secs:  i64,
    nanos: u32,
}

impl StoredRecord {
    pub(crate) fn from_time(at: DateTime<Utc>) -> Self {
        Self {
            secs:  at.timestamp(),
            nanos: at.timestamp_subsec_nanos(),
        }
    }

    pub(crate) fn to_time(self) -> Option<DateTime<Utc>> { DateTime::from_timestamp(self.secs, self.nanos) }
}

/// A superseded file and the instant it was superseded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryRecord {
    pub path:          String,
    pub superseded_at: DateTime<Utc>,
}

impl ExpiryRecord {
    /// Reclaimable once `grace` has fully elapsed since supersession.
    pub fn is_expired(&self, now: DateTime<Utc>, grace: TimeDelta) -> bool {
        self.superseded_at
            .checked_add_signed(grace)
            .is_some_and(|deadline| deadline <= now)
    }
}
