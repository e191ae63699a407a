use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountName;

/// Resume position of the poller's walk over the follow list.
///
/// `index` is the position in the TrackedSet of the next entity to scan.
/// `resume_cursor` is only meaningful for the entity at `index`: it is the
/// history cursor a suspended probe stopped at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    #[serde(default)]
    pub observer: Option<AccountName>,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub resume_cursor: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScanCheckpoint {
    /// A checkpoint at the start of the follow list.
    pub fn start(observer: AccountName) -> Self {
        Self {
            observer: Some(observer),
            ..Self::default()
        }
    }

    /// Is this checkpoint usable for `observer`? A checkpoint written for a
    /// different observer points into a different follow list.
    pub fn belongs_to(&self, observer: &AccountName) -> bool {
        self.observer.as_ref() == Some(observer)
    }

    /// Record that entities before `index` are done.
    pub fn advance_to(&mut self, index: usize, now: DateTime<Utc>) {
        self.index = index;
        self.resume_cursor = None;
        self.updated_at = Some(now);
    }

    /// Record a suspended walk inside the entity at `index`.
    pub fn suspend_at(&mut self, index: usize, cursor: Option<u64>, now: DateTime<Utc>) {
        self.index = index;
        self.resume_cursor = cursor;
        self.updated_at = Some(now);
    }

    /// Back to the start of the list.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.advance_to(0, now);
    }

    /// Cursor to resume the entity at `index` with, if any.
    pub fn cursor_for(&self, index: usize) -> Option<u64> {
        if index == self.index {
            self.resume_cursor
        } else {
            None
        }
    }
}
