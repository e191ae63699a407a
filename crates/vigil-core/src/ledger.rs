//! LedgerStore - Activity Ledger と display marks の永続化
//!
//! 壊れた値・欠けた値は空の ledger / marks として読みます。

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{AccountName, ActivityEntry, DisplayMarks, Ledger, StoreError};
use crate::ports::{DurableStore, keys, load_or_default, save_json};

#[derive(Clone)]
pub struct LedgerStore {
    store: Arc<dyn DurableStore>,
}

impl LedgerStore {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Result<Ledger, StoreError> {
        load_or_default(self.store.as_ref(), keys::LEDGER).await
    }

    pub async fn save(&self, ledger: &Ledger) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), keys::LEDGER, ledger).await
    }

    pub async fn load_marks(&self) -> Result<DisplayMarks, StoreError> {
        load_or_default(self.store.as_ref(), keys::DISPLAY_MARKS).await
    }

    pub async fn save_marks(&self, marks: &DisplayMarks) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), keys::DISPLAY_MARKS, marks).await
    }
}

/// Lower bound for an entity's scan: the ledger's display time, else the
/// display mark, else `fallback`.
pub fn since_for(
    ledger: &Ledger,
    marks: &DisplayMarks,
    entity: &AccountName,
    fallback: DateTime<Utc>,
) -> DateTime<Utc> {
    ledger
        .get(entity)
        .map(|entry| entry.last_display_time)
        .or_else(|| marks.get(entity))
        .unwrap_or(fallback)
}

/// Lower bound for the viewer's full scan of a pending entry.
///
/// A new entry's display time sits just before its newest observed item, so
/// the bound falls back to the display mark (or `fallback` when the entity
/// was never shown) to include everything since the last view.
pub fn view_floor(
    entry: &ActivityEntry,
    marks: &DisplayMarks,
    fallback: DateTime<Utc>,
) -> DateTime<Utc> {
    let shown = marks.get(&entry.entity).unwrap_or(fallback);
    entry.last_display_time.min(shown)
}
