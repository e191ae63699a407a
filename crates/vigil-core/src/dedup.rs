//! Dedup table: `(author, permlink)` pairs already surfaced to the viewer.
//!
//! Loaded once per scan, mutated in memory and flushed at the end. Entries are
//! never evicted, so the table grows with every item ever shown.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{AccountName, StoreError};
use crate::ports::{DurableStore, keys, load_or_default, save_json};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub author: AccountName,
    pub permlink: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupTable {
    seen: BTreeSet<DedupKey>,
}

impl DedupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(store: &dyn DurableStore) -> Result<Self, StoreError> {
        load_or_default(store, keys::DEDUP).await
    }

    pub async fn flush(&self, store: &dyn DurableStore) -> Result<(), StoreError> {
        save_json(store, keys::DEDUP, self).await
    }

    /// `true` the first time a pair is seen; records it.
    pub fn is_new(&mut self, author: &AccountName, permlink: &str) -> bool {
        self.seen.insert(DedupKey {
            author: author.clone(),
            permlink: permlink.to_string(),
        })
    }

    pub fn contains(&self, author: &AccountName, permlink: &str) -> bool {
        self.seen.contains(&DedupKey {
            author: author.clone(),
            permlink: permlink.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
