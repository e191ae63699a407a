//! CheckpointStore - poller の再開位置の永続化
//!
//! プリエンプトされた poller の checkpoint を 0 に戻す `PreemptionHook` も
//! ここで実装します。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::{AccountName, HolderKind, LockRecord, ScanCheckpoint, StoreError};
use crate::lock::PreemptionHook;
use crate::ports::{Clock, DurableStore, keys, load_or_default, save_json};

#[derive(Clone)]
pub struct CheckpointStore {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The stored checkpoint as-is (default when missing or malformed).
    pub async fn load_raw(&self) -> Result<ScanCheckpoint, StoreError> {
        load_or_default(self.store.as_ref(), keys::CHECKPOINT).await
    }

    /// Checkpoint for `observer`. One written for another observer starts over.
    pub async fn load(&self, observer: &AccountName) -> Result<ScanCheckpoint, StoreError> {
        let checkpoint = self.load_raw().await?;
        if checkpoint.belongs_to(observer) {
            return Ok(checkpoint);
        }
        if let Some(previous) = &checkpoint.observer {
            info!(%previous, %observer, "observer changed, checkpoint starts over");
        }
        Ok(ScanCheckpoint::start(observer.clone()))
    }

    pub async fn save(&self, checkpoint: &ScanCheckpoint) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), keys::CHECKPOINT, checkpoint).await
    }

    /// Back to index 0, keeping the observer.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let mut checkpoint = self.load_raw().await?;
        checkpoint.reset(self.clock.now());
        self.save(&checkpoint).await
    }
}

#[async_trait]
impl PreemptionHook for CheckpointStore {
    async fn on_preempted(&self, preempted: &LockRecord) {
        if preempted.holder.kind != HolderKind::Poller {
            return;
        }
        match self.reset().await {
            Ok(()) => info!(preempted = %preempted.holder, "poll checkpoint reset"),
            Err(err) => warn!(error = %err, "failed to reset poll checkpoint"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Holder, InstanceId, Resource};
    use crate::impls::InMemoryStore;
    use crate::lock::LockManager;
    use crate::ports::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use ulid::Ulid;

    const STALE: Duration = Duration::from_secs(120);

    fn setup() -> (Arc<InMemoryStore>, Arc<ManualClock>, CheckpointStore) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ));
        let checkpoints = CheckpointStore::new(store.clone(), clock.clone());
        (store, clock, checkpoints)
    }

    #[tokio::test]
    async fn other_observers_checkpoint_is_ignored() {
        let (_, clock, checkpoints) = setup();
        let mut cp = ScanCheckpoint::start(AccountName::new("alice"));
        cp.advance_to(7, clock.now());
        checkpoints.save(&cp).await.unwrap();

        assert_eq!(checkpoints.load(&AccountName::new("alice")).await.unwrap().index, 7);
        assert_eq!(checkpoints.load(&AccountName::new("bob")).await.unwrap().index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn viewer_preempting_poller_resets_checkpoint() {
        let (store, clock, checkpoints) = setup();
        let observer = AccountName::new("observer");
        let locks = LockManager::new(store.clone(), clock.clone(), Resource::ActivityScan)
            .with_preemption_hook(Arc::new(checkpoints.clone()));
        let poller = Holder::new(HolderKind::Poller, InstanceId::from_ulid(Ulid::new()));
        let viewer = Holder::new(HolderKind::Viewer, InstanceId::from_ulid(Ulid::new()));

        assert!(locks.acquire(&poller, 1, STALE, Duration::ZERO).await.unwrap());
        let mut cp = checkpoints.load(&observer).await.unwrap();
        cp.suspend_at(5, Some(900), clock.now());
        checkpoints.save(&cp).await.unwrap();

        assert!(locks.acquire(&viewer, 2, STALE, Duration::ZERO).await.unwrap());

        let after = checkpoints.load(&observer).await.unwrap();
        assert_eq!(after.index, 0);
        assert_eq!(after.resume_cursor, None);
        assert_eq!(locks.inspect().await.unwrap().unwrap().holder, viewer);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_reclaim_keeps_checkpoint() {
        let (store, clock, checkpoints) = setup();
        let observer = AccountName::new("observer");
        let locks = LockManager::new(store.clone(), clock.clone(), Resource::ActivityScan)
            .with_preemption_hook(Arc::new(checkpoints.clone()));
        let crashed = Holder::new(HolderKind::Poller, InstanceId::from_ulid(Ulid::new()));
        let next = Holder::new(HolderKind::Poller, InstanceId::from_ulid(Ulid::new()));

        assert!(locks.acquire(&crashed, 1, STALE, Duration::ZERO).await.unwrap());
        let mut cp = checkpoints.load(&observer).await.unwrap();
        cp.advance_to(3, clock.now());
        checkpoints.save(&cp).await.unwrap();

        clock.advance(Duration::from_secs(300));
        assert!(locks.acquire(&next, 1, STALE, Duration::ZERO).await.unwrap());
        assert_eq!(checkpoints.load(&observer).await.unwrap().index, 3);
    }
}
