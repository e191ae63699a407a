//! AppContext - ports のワイヤリング
//!
//! Poller と Viewer が共有する協調者の束です。プロセス内の共有状態は
//! 持たず、状態はすべて `store` を経由します。

use std::sync::Arc;

use crate::backoff::BackoffPolicy;
use crate::checkpoint::CheckpointStore;
use crate::config::Tuning;
use crate::domain::Resource;
use crate::ledger::LedgerStore;
use crate::lock::LockManager;
use crate::ports::{Clock, DurableStore, IdGenerator, Notifier, RemoteApi, SettingsSource};
use crate::scanner::Scanner;

#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn DurableStore>,
    pub remote: Arc<dyn RemoteApi>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub settings: Arc<dyn SettingsSource>,
    pub tuning: Tuning,
}

impl AppContext {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::from(&self.tuning.backoff)
    }

    pub fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.store.clone(), self.clock.clone())
    }

    pub fn ledgers(&self) -> LedgerStore {
        LedgerStore::new(self.store.clone())
    }

    /// Lock manager for the activity state. Preempting a poller resets its checkpoint.
    pub fn locks(&self) -> LockManager {
        LockManager::new(self.store.clone(), self.clock.clone(), Resource::ActivityScan)
            .with_retry_interval(self.tuning.lock.retry_interval())
            .with_preemption_hook(Arc::new(self.checkpoints()))
    }

    pub fn scanner(&self) -> Scanner {
        Scanner::new(self.remote.clone(), self.backoff(), self.tuning.page_size)
    }
}
