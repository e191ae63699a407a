//! Activity Ledger and display marks.
//!
//! The ledger maps each tracked entity to the time of its latest observed
//! activity and the time it was last shown. The poller merges into it; the
//! viewer consumes and removes entries.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountName;

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub entity: AccountName,
    pub activity_time: DateTime<Utc>,
    pub last_display_time: DateTime<Utc>,
}

impl ActivityEntry {
    /// Does the entry carry activity that has not been shown yet?
    pub fn has_new_activity(&self) -> bool {
        self.activity_time > self.last_display_time
    }
}

/// entity → entry.
///
/// Persisted as a list, the way older state files stored it. Loading folds
/// duplicate rows left behind by repeated preemption: the earliest
/// `activity_time` and the latest `last_display_time` win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ActivityEntry>", into = "Vec<ActivityEntry>")]
pub struct Ledger {
    entries: BTreeMap<AccountName, ActivityEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from raw rows, collapsing duplicates per entity.
    pub fn normalize(rows: impl IntoIterator<Item = ActivityEntry>) -> Self {
        let mut entries: BTreeMap<AccountName, ActivityEntry> = BTreeMap::new();
        for row in rows {
            match entries.get_mut(&row.entity) {
                Some(existing) => {
                    existing.activity_time = existing.activity_time.min(row.activity_time);
                    existing.last_display_time =
                        existing.last_display_time.max(row.last_display_time);
                }
                None => {
                    entries.insert(row.entity.clone(), row);
                }
            }
        }
        Self { entries }
    }

    /// Fold an observation into the ledger.
    ///
    /// Accepted only when `observed` is strictly after the entity's
    /// `last_display_time`, or the entity has no entry. A new entry starts
    /// with `last_display_time = observed - 1s` so it reads as unseen.
    /// `activity_time` never decreases.
    ///
    /// Returns `true` when the entry is new or its `activity_time` advanced.
    pub fn merge_activity(&mut self, entity: &AccountName, observed: DateTime<Utc>) -> bool {
        match self.entries.get_mut(entity) {
            None => {
                self.entries.insert(
                    entity.clone(),
                    ActivityEntry {
                        entity: entity.clone(),
                        activity_time: observed,
                        last_display_time: observed - TimeDelta::seconds(1),
                    },
                );
                true
            }
            Some(entry) => {
                if observed <= entry.last_display_time || observed <= entry.activity_time {
                    return false;
                }
                entry.activity_time = observed;
                true
            }
        }
    }

    /// Drop entries whose entity is no longer tracked. Returns how many were removed.
    pub fn prune(&mut self, tracked: &BTreeSet<AccountName>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entity, _| tracked.contains(entity));
        before - self.entries.len()
    }

    pub fn get(&self, entity: &AccountName) -> Option<&ActivityEntry> {
        self.entries.get(entity)
    }

    pub fn remove(&mut self, entity: &AccountName) -> Option<ActivityEntry> {
        self.entries.remove(entity)
    }

    /// Entries ordered by most recent activity first.
    pub fn by_recency(&self) -> Vec<ActivityEntry> {
        let mut rows: Vec<ActivityEntry> = self.entries.values().cloned().collect();
        rows.sort_by(|a, b| {
            b.activity_time
                .cmp(&a.activity_time)
                .then_with(|| a.entity.cmp(&b.entity))
        });
        rows
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<ActivityEntry>> for Ledger {
    fn from(rows: Vec<ActivityEntry>) -> Self {
        Self::normalize(rows)
    }
}

impl From<Ledger> for Vec<ActivityEntry> {
    fn from(ledger: Ledger) -> Self {
        ledger.entries.into_values().collect()
    }
}

/// entity → last time its activity was shown.
///
/// Outlives ledger entries: once the viewer removes an entry, the mark is the
/// entity's "last known display time" for the next poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayMarks(BTreeMap<AccountName, DateTime<Utc>>);

impl DisplayMarks {
    pub fn get(&self, entity: &AccountName) -> Option<DateTime<Utc>> {
        self.0.get(entity).copied()
    }

    /// Advance the mark; never moves it backwards.
    pub fn advance(&mut self, entity: &AccountName, shown_at: DateTime<Utc>) {
        let slot = self.0.entry(entity.clone()).or_insert(shown_at);
        if shown_at > *slot {
            *slot = shown_at;
        }
    }

    pub fn prune(&mut self, tracked: &BTreeSet<AccountName>) -> usize {
        let before = self.0.len();
        self.0.retain(|entity, _| tracked.contains(entity));
        before - self.0.len()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
