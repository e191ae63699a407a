//! LockManager - Durable Store 上の優先度付き排他ロック
//!
//! # 取得ルール（上から順に判定）
//! 1. レコードが無い
//! 2. レコードが自分のもの（再入）
//! 3. レコードが `stale_after` より古い（持ち主がクラッシュしたとみなす）
//! 4. 自分の priority が既存より厳密に大きい（プリエンプト）
//!
//! 取得できなければ `retry_interval` ごとに再試行し、`max_wait` を過ぎたら
//! `false` を返します。無期限に待つことはありません。
//!
//! 書き込みの後にレコードを読み直し、自分の名前が残っている場合だけ成功と
//! します（同時に書いた場合は最初の書き手が勝つ）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::{Grant, Holder, LockRecord, Resource, StoreError};
use crate::ports::{Clock, DurableStore, load_or_default, save_json};

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(15);

/// Called after a fresh lock record of another holder was overwritten by a
/// higher-priority acquisition.
#[async_trait]
pub trait PreemptionHook: Send + Sync {
    async fn on_preempted(&self, preempted: &LockRecord);
}

pub struct LockManager {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    resource: Resource,
    retry_interval: Duration,
    hook: Option<Arc<dyn PreemptionHook>>,
}

impl LockManager {
    pub fn new(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>, resource: Resource) -> Self {
        Self {
            store,
            clock,
            resource,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            hook: None,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_preemption_hook(mut self, hook: Arc<dyn PreemptionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    fn key(&self) -> &'static str {
        self.resource.store_key()
    }

    /// Current lock record. A malformed record reads as no record.
    pub async fn inspect(&self) -> Result<Option<LockRecord>, StoreError> {
        load_or_default::<Option<LockRecord>>(self.store.as_ref(), self.key()).await
    }

    /// Acquire the lock, retrying every `retry_interval` until `max_wait` elapses.
    ///
    /// Contention is not an error: returns `Ok(false)` when the lock could
    /// not be taken in time.
    pub async fn acquire(
        &self,
        holder: &Holder,
        priority: u8,
        stale_after: Duration,
        max_wait: Duration,
    ) -> Result<bool, StoreError> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            if self.try_acquire(holder, priority, stale_after).await? {
                return Ok(true);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                debug!(%holder, "lock busy, giving up");
                return Ok(false);
            }
            tokio::time::sleep(self.retry_interval.min(deadline - now)).await;
        }
    }

    /// One acquisition attempt.
    pub async fn try_acquire(
        &self,
        holder: &Holder,
        priority: u8,
        stale_after: Duration,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let current = self.inspect().await?;
        let grant = match &current {
            None => Grant::Vacant,
            Some(record) => match record.admits(holder, priority, now, stale_after) {
                Some(grant) => grant,
                None => {
                    debug!(%holder, current = %record.holder, "lock held");
                    return Ok(false);
                }
            },
        };

        let record = LockRecord::new(*holder, priority, now);
        save_json(self.store.as_ref(), self.key(), &record).await?;

        match self.inspect().await? {
            Some(written) if written.holder == *holder => {}
            other => {
                debug!(%holder, winner = ?other.map(|r| r.holder), "lost acquisition race");
                return Ok(false);
            }
        }

        match (grant, current) {
            (Grant::Preempt, Some(preempted)) => {
                info!(%holder, preempted = %preempted.holder, "lock preempted");
                if let Some(hook) = &self.hook {
                    hook.on_preempted(&preempted).await;
                }
            }
            (Grant::Stale, Some(stale)) => {
                info!(%holder, stale = %stale.holder, "reclaimed stale lock");
            }
            _ => debug!(%holder, ?grant, "lock acquired"),
        }
        Ok(true)
    }

    /// Extend the lease. Succeeds only for the current holder.
    pub async fn refresh(&self, holder: &Holder) -> Result<bool, StoreError> {
        match self.inspect().await? {
            Some(record) if record.holder == *holder => {
                let renewed = LockRecord::new(*holder, record.priority, self.clock.now());
                save_json(self.store.as_ref(), self.key(), &renewed).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Release the lock. A non-holder release changes nothing and returns `false`.
    pub async fn release(&self, holder: &Holder) -> Result<bool, StoreError> {
        match self.inspect().await? {
            Some(record) if record.holder == *holder => {
                self.store.remove(&[self.key()]).await?;
                debug!(%holder, "lock released");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
