//! DurableStore port - 永続 KV ストア
//!
//! Poller と Viewer が共有する唯一の可変リソースです。
//! 複数キーをまたぐトランザクションは前提にしません（キーごとに read-modify-write）。

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::domain::StoreError;

/// Keys of the independent records kept in the store.
pub mod keys {
    pub const LEDGER: &str = "activity/ledger";
    pub const DISPLAY_MARKS: &str = "activity/display-marks";
    pub const CHECKPOINT: &str = "poll/checkpoint";
    pub const DEDUP: &str = "scan/dedup";
}

/// Async get/set/remove over named keys.
///
/// The last write must be observed by the next read.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Values of the requested keys that exist; missing keys are absent from the map.
    async fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, Value>, StoreError>;

    async fn set(&self, entries: BTreeMap<String, Value>) -> Result<(), StoreError>;

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;
}

/// Read and decode one key.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn DurableStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let mut found = store.get(&[key]).await?;
    match found.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Decode {
                key: key.to_string(),
                source,
            }),
    }
}

/// Read one key, repairing a missing or malformed value with `T::default()`.
///
/// I/O failures still propagate.
pub async fn load_or_default<T: DeserializeOwned + Default>(
    store: &dyn DurableStore,
    key: &str,
) -> Result<T, StoreError> {
    match load_json(store, key).await {
        Ok(value) => Ok(value.unwrap_or_default()),
        Err(err @ StoreError::Decode { .. }) => {
            warn!(key, error = %err, "discarding malformed stored value");
            Ok(T::default())
        }
        Err(err) => Err(err),
    }
}

/// Encode and write one key.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn DurableStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value)?;
    store
        .set(BTreeMap::from([(key.to_string(), value)]))
        .await
}
