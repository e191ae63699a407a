//! InMemoryStore - 開発・テスト用の DurableStore

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::StoreError;
use crate::ports::DurableStore;

/// Process-local store. Clones share the same map, which lets tests hand one
/// store to a poller and a viewer.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything currently stored.
    pub async fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, Value>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, new_entries: BTreeMap<String, Value>) -> Result<(), StoreError> {
        self.entries.lock().await.extend(new_entries);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn last_write_is_visible_to_next_read() {
        let store = InMemoryStore::new();
        store
            .set(BTreeMap::from([("a".to_string(), json!(1))]))
            .await
            .unwrap();
        store
            .set(BTreeMap::from([("a".to_string(), json!(2))]))
            .await
            .unwrap();

        let got = store.get(&["a", "missing"]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["a"], json!(2));
    }

    #[tokio::test]
    async fn clones_share_state_and_remove_works() {
        let store = InMemoryStore::new();
        let other = store.clone();
        store
            .set(BTreeMap::from([("k".to_string(), json!("v"))]))
            .await
            .unwrap();
        assert_eq!(other.get(&["k"]).await.unwrap()["k"], json!("v"));

        other.remove(&["k"]).await.unwrap();
        assert!(store.get(&["k"]).await.unwrap().is_empty());
    }
}
