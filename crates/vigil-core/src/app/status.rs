//! Status - 永続状態のスナップショット
//!
//! ロックの持ち主、checkpoint、ledger の中身を一度に読み出します。
//! ロックは取りません（読むだけ）。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::AppContext;
use crate::dedup::DedupTable;
use crate::domain::{ActivityEntry, LockRecord, ScanCheckpoint, StoreError};
use crate::ports::{keys, load_or_default};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub taken_at: DateTime<Utc>,
    pub lock: Option<LockRecord>,
    pub lock_stale: bool,
    pub checkpoint: ScanCheckpoint,
    /// Pending entities, most recent activity first.
    pub pending: Vec<ActivityEntry>,
    pub display_marks: usize,
    pub dedup_entries: usize,
}

impl StatusSnapshot {
    pub async fn collect(ctx: &AppContext) -> Result<Self, StoreError> {
        let now = ctx.clock.now();
        let lock = ctx.locks().inspect().await?;
        let lock_stale = lock
            .as_ref()
            .is_some_and(|record| record.is_stale(now, ctx.tuning.lock.stale_after()));
        let checkpoint = load_or_default(ctx.store.as_ref(), keys::CHECKPOINT).await?;
        let ledgers = ctx.ledgers();
        let pending = ledgers.load().await?.by_recency();
        let display_marks = ledgers.load_marks().await?.len();
        let dedup_entries = DedupTable::load(ctx.store.as_ref()).await?.len();
        Ok(Self {
            taken_at: now,
            lock,
            lock_stale,
            checkpoint,
            pending,
            display_marks,
            dedup_entries,
        })
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lock {
            Some(record) => writeln!(
                f,
                "lock:       {} (priority {}, since {}{})",
                record.holder,
                record.priority,
                record.acquired_at.to_rfc3339(),
                if self.lock_stale { ", stale" } else { "" }
            )?,
            None => writeln!(f, "lock:       free")?,
        }
        let observer = self
            .checkpoint
            .observer
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        write!(f, "checkpoint: index {} for @{observer}", self.checkpoint.index)?;
        if let Some(cursor) = self.checkpoint.resume_cursor {
            write!(f, ", resume at {cursor}")?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "dedup:      {} items; display marks: {}",
            self.dedup_entries, self.display_marks
        )?;
        writeln!(f, "pending:    {}", self.pending.len())?;
        for entry in &self.pending {
            writeln!(f, "  @{} at {}", entry.entity, entry.activity_time.to_rfc3339())?;
        }
        Ok(())
    }
}
