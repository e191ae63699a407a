//! Lock records and the holder → priority table.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::ids::InstanceId;

/// The logical resources that can be locked.
///
/// Only one exists today: the activity state (ledger, checkpoint, dedup table)
/// shared by the poller and the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    ActivityScan,
}

impl Resource {
    /// Durable Store key of this resource's lock record.
    pub fn store_key(self) -> &'static str {
        match self {
            Resource::ActivityScan => "lock/activity-scan",
        }
    }
}

/// Kind of execution context competing for the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderKind {
    /// Timer-driven background poller.
    Poller,
    /// User-triggered foreground viewer.
    Viewer,
}

impl HolderKind {
    /// Priority table. The viewer must never starve behind a slow scan.
    pub fn priority(self) -> u8 {
        match self {
            HolderKind::Poller => 1,
            HolderKind::Viewer => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HolderKind::Poller => "poller",
            HolderKind::Viewer => "viewer",
        }
    }
}

/// Identity of a lock holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Holder {
    pub kind: HolderKind,
    pub instance: InstanceId,
}

impl Holder {
    pub fn new(kind: HolderKind, instance: InstanceId) -> Self {
        Self { kind, instance }
    }
}

impl std::fmt::Display for Holder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.instance)
    }
}

/// The single persisted lock record of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub holder: Holder,
    pub priority: u8,
    pub acquired_at: DateTime<Utc>,
}

/// Why an acquisition over an existing record is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// No record exists.
    Vacant,
    /// The record already belongs to the caller.
    Reentrant,
    /// The record is older than the staleness threshold.
    Stale,
    /// The caller's priority strictly exceeds the holder's.
    Preempt,
}

impl LockRecord {
    pub fn new(holder: Holder, priority: u8, acquired_at: DateTime<Utc>) -> Self {
        Self {
            holder,
            priority,
            acquired_at,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        let threshold = TimeDelta::from_std(stale_after).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(self.acquired_at) > threshold
    }

    /// Decide whether `holder` at `priority` may overwrite this record.
    ///
    /// Checked in order: ownership, staleness, priority. Returns `None` when
    /// the caller must wait.
    pub fn admits(
        &self,
        holder: &Holder,
        priority: u8,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Option<Grant> {
        if self.holder == *holder {
            Some(Grant::Reentrant)
        } else if self.is_stale(now, stale_after) {
            Some(Grant::Stale)
        } else if priority > self.priority {
            Some(Grant::Preempt)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn holder(kind: HolderKind) -> Holder {
        Holder::new(kind, InstanceId::from_ulid(Ulid::new()))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    const STALE: Duration = Duration::from_secs(120);

    #[test]
    fn priority_table_favors_viewer() {
        assert!(HolderKind::Viewer.priority() > HolderKind::Poller.priority());
    }

    #[test]
    fn owner_is_always_admitted() {
        let poller = holder(HolderKind::Poller);
        let record = LockRecord::new(poller, 1, at(0));
        assert_eq!(record.admits(&poller, 1, at(1), STALE), Some(Grant::Reentrant));
    }

    #[test]
    fn fresh_equal_priority_is_rejected() {
        let record = LockRecord::new(holder(HolderKind::Poller), 1, at(0));
        let other = holder(HolderKind::Poller);
        assert_eq!(record.admits(&other, 1, at(60), STALE), None);
    }

    #[test]
    fn higher_priority_preempts_fresh_record() {
        let record = LockRecord::new(holder(HolderKind::Poller), 1, at(0));
        let viewer = holder(HolderKind::Viewer);
        assert_eq!(record.admits(&viewer, 2, at(1), STALE), Some(Grant::Preempt));
    }

    #[test]
    fn stale_record_admits_lower_priority() {
        let record = LockRecord::new(holder(HolderKind::Viewer), 2, at(0));
        let poller = holder(HolderKind::Poller);
        assert_eq!(record.admits(&poller, 1, at(120), STALE), None);
        assert_eq!(record.admits(&poller, 1, at(121), STALE), Some(Grant::Stale));
    }

    #[test]
    fn resource_key_is_stable() {
        assert_eq!(Resource::ActivityScan.store_key(), "lock/activity-scan");
    }
}
