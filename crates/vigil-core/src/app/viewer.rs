//! ViewerAggregator - ユーザー操作で開くフィード
//!
//! 高い priority でロックを取り（poller をプリエンプトする）、ledger の
//! エンティティごとにフルスキャンして、表示した分を ledger から消します。
//! 状態はエンティティごとに保存し、ロックを失ったらそこで打ち切ります。
//! ロックはエラー時も含めて必ず解放します。

use tracing::{Instrument, debug, info, info_span, warn};

use crate::app::AppContext;
use crate::app::render::{FeedItem, FeedSection, FeedView};
use crate::config::Settings;
use crate::dedup::DedupTable;
use crate::domain::{ActivityEntry, ClassifiedItem, Holder, HolderKind, Result};
use crate::ledger::view_floor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOutcome {
    /// The lock could not be taken within the viewer's wait.
    Busy,
    Rendered(FeedView),
}

pub struct ViewerAggregator {
    ctx: AppContext,
    holder: Holder,
}

impl ViewerAggregator {
    pub fn new(ctx: AppContext) -> Self {
        let holder = Holder::new(HolderKind::Viewer, ctx.ids.instance_id());
        Self { ctx, holder }
    }

    pub fn holder(&self) -> &Holder {
        &self.holder
    }

    pub async fn open(&self) -> Result<ViewOutcome> {
        let settings = self.ctx.settings.load().await?;
        let span = info_span!("view", observer = %settings.observer);
        self.open_with(&settings).instrument(span).await
    }

    async fn open_with(&self, settings: &Settings) -> Result<ViewOutcome> {
        let lock = &self.ctx.tuning.lock;
        let locks = self.ctx.locks();
        let acquired = locks
            .acquire(
                &self.holder,
                HolderKind::Viewer.priority(),
                lock.stale_after(),
                lock.viewer_max_wait(),
            )
            .await?;
        if !acquired {
            info!("lock busy");
            return Ok(ViewOutcome::Busy);
        }

        let rendered = self.aggregate(settings).await;
        match locks.release(&self.holder).await {
            Ok(true) => {}
            Ok(false) => warn!("lock was no longer ours at release"),
            Err(err) => warn!(error = %err, "failed to release lock"),
        }
        rendered.map(ViewOutcome::Rendered)
    }

    /// Render pending entities, most recent first.
    ///
    /// Each entity's state is saved right after its section is rendered, and
    /// only while the lock is still ours. A section whose state could not be
    /// saved is left out of the view, so it is shown again next time.
    async fn aggregate(&self, settings: &Settings) -> Result<FeedView> {
        let ledgers = self.ctx.ledgers();
        let mut ledger = ledgers.load().await?;
        let mut marks = ledgers.load_marks().await?;
        let mut dedup = DedupTable::load(self.ctx.store.as_ref()).await?;
        let scanner = self.ctx.scanner();
        let locks = self.ctx.locks();
        let now = self.ctx.clock.now();
        let fallback = now - self.ctx.tuning.lookback();

        let mut view = FeedView {
            observer: settings.observer.clone(),
            generated_at: now,
            sections: Vec::new(),
        };

        for entry in ledger.by_recency() {
            let since = view_floor(&entry, &marks, fallback);
            let ActivityEntry {
                entity,
                activity_time,
                ..
            } = entry;
            let report = scanner.scan(&entity, since, None, &mut dedup).await;

            let mut items: Vec<ClassifiedItem> = report.items().into_iter().cloned().collect();
            for item in &mut items {
                self.enrich(item).await;
            }
            let incomplete = report.error.is_some();
            if incomplete {
                warn!(%entity, items = items.len(), "scan incomplete, entity stays pending");
            } else {
                ledger.remove(&entity);
                let shown_up_to = report
                    .newest_activity
                    .map_or(activity_time, |newest| newest.max(activity_time));
                marks.advance(&entity, shown_up_to);
            }

            if !locks.refresh(&self.holder).await? {
                warn!(%entity, "lock lost while viewing, stopping before save");
                return Ok(view);
            }
            ledgers.save(&ledger).await?;
            ledgers.save_marks(&marks).await?;
            dedup.flush(self.ctx.store.as_ref()).await?;

            if !items.is_empty() || incomplete {
                view.sections.push(FeedSection {
                    entity: entity.clone(),
                    activity_time,
                    items: items
                        .iter()
                        .map(|item| FeedItem::from_item(item, &settings.display_endpoint))
                        .collect(),
                    incomplete,
                });
            }
        }

        info!(
            sections = view.sections.len(),
            items = view.item_count(),
            pending = ledger.len(),
            "feed rendered"
        );
        Ok(view)
    }

    /// Replace the history snapshot with current content; keep it on failure.
    async fn enrich(&self, item: &mut ClassifiedItem) {
        let fetched = self
            .ctx
            .backoff()
            .run("content", || self.ctx.remote.content(&item.author, &item.permlink))
            .await;
        match fetched {
            Ok(content) => item.enrich(content),
            Err(err) => {
                debug!(author = %item.author, permlink = %item.permlink, error = %err, "using history snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::context::testing::{TakeLockOnHistory, ago, harness};
    use crate::app::poller::{CycleOutcome, PollOrchestrator};
    use crate::config::Tuning;
    use crate::domain::{AccountName, DisplayMarks, InstanceId, ItemKind, RemoteError};
    use crate::impls::Method;
    use std::sync::Arc;
    use std::time::Duration;
    use ulid::Ulid;

    fn permlinks(view: &FeedView) -> Vec<String> {
        view.sections
            .iter()
            .flat_map(|section| section.items.iter().map(|item| item.permlink.clone()))
            .collect()
    }

    fn rendered(outcome: ViewOutcome) -> FeedView {
        match outcome {
            ViewOutcome::Rendered(view) => view,
            ViewOutcome::Busy => panic!("viewer was busy"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn poll_then_view_shows_items_once() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice", "bob"]);
        h.remote.post("alice", "hello", ago(600));
        h.remote.post("bob", "b1", ago(500));
        let poller = PollOrchestrator::new(h.ctx.clone());
        assert_eq!(poller.run_cycle().await.unwrap().changed, 2);

        h.remote.reply("bob", "alice", "hello", "re-hello", ago(300));
        assert_eq!(poller.run_cycle().await.unwrap().changed, 2);

        let viewer = ViewerAggregator::new(h.ctx.clone());
        let view = rendered(viewer.open().await.unwrap());

        // bob's reply sits in both histories but is shown once, under alice.
        assert_eq!(view.item_count(), 3);
        let alice = &view.sections[0];
        assert_eq!(alice.entity, AccountName::new("alice"));
        let kinds: Vec<ItemKind> = alice.items.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![ItemKind::Reply, ItemKind::Post]);
        assert_eq!(alice.items[0].link, "https://steemit.com/@bob/re-hello");
        let bob = &view.sections[1];
        assert_eq!(bob.items.len(), 1);
        assert_eq!(bob.items[0].permlink, "b1");

        assert!(h.ctx.ledgers().load().await.unwrap().is_empty());
        assert!(h.ctx.locks().inspect().await.unwrap().is_none());
        let marks = h.ctx.ledgers().load_marks().await.unwrap();
        assert_eq!(marks.get(&AccountName::new("alice")), Some(ago(300)));
        assert_eq!(marks.get(&AccountName::new("bob")), Some(ago(300)));

        // Nothing new: a poll finds no change and a view renders nothing.
        assert_eq!(poller.run_cycle().await.unwrap().changed, 0);
        assert!(rendered(viewer.open().await.unwrap()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_view_shows_every_item_since_the_lookback() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice"]);
        h.remote.post("alice", "ancient", ago(2 * 24 * 3600));
        h.remote.post("alice", "older", ago(600));
        h.remote.post("alice", "newer", ago(300));
        let poller = PollOrchestrator::new(h.ctx.clone());
        assert_eq!(poller.run_cycle().await.unwrap().changed, 1);

        let viewer = ViewerAggregator::new(h.ctx.clone());
        let view = rendered(viewer.open().await.unwrap());
        assert_eq!(permlinks(&view), vec!["newer", "older"]);
        let marks = h.ctx.ledgers().load_marks().await.unwrap();
        assert_eq!(marks.get(&AccountName::new("alice")), Some(ago(300)));

        assert_eq!(poller.run_cycle().await.unwrap().changed, 0);
        assert!(rendered(viewer.open().await.unwrap()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_entry_is_shown_from_the_previous_display_mark() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice"]);
        let mut marks = DisplayMarks::default();
        marks.advance(&AccountName::new("alice"), ago(900));
        h.ctx.ledgers().save_marks(&marks).await.unwrap();
        h.remote.post("alice", "seen", ago(1200));
        h.remote.post("alice", "a", ago(600));
        h.remote.post("alice", "b", ago(300));

        assert_eq!(
            PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap().changed,
            1
        );
        let view = rendered(ViewerAggregator::new(h.ctx.clone()).open().await.unwrap());
        assert_eq!(permlinks(&view), vec!["b", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_lock_keeps_only_saved_sections() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice", "bob"]);
        h.remote.post("alice", "a1", ago(100));
        h.remote.post("bob", "b1", ago(200));
        PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();

        let other = Holder::new(HolderKind::Viewer, InstanceId::from_ulid(Ulid::new()));
        let mut ctx = h.ctx.clone();
        ctx.remote = Arc::new(TakeLockOnHistory {
            inner: h.remote.clone(),
            locks: h.ctx.locks(),
            taker: other,
            priority: HolderKind::Viewer.priority() + 1,
            victim: AccountName::new("bob"),
        });

        let view = rendered(ViewerAggregator::new(ctx).open().await.unwrap());

        // alice was saved before bob's scan; bob stays pending for the next view.
        assert_eq!(permlinks(&view), vec!["a1"]);
        let ledger = h.ctx.ledgers().load().await.unwrap();
        assert!(ledger.get(&AccountName::new("alice")).is_none());
        assert!(ledger.get(&AccountName::new("bob")).is_some());
        let marks = h.ctx.ledgers().load_marks().await.unwrap();
        assert_eq!(marks.get(&AccountName::new("alice")), Some(ago(100)));
        assert_eq!(marks.get(&AccountName::new("bob")), None);
        let dedup = DedupTable::load(h.store.as_ref()).await.unwrap();
        assert!(dedup.contains(&AccountName::new("alice"), "a1"));
        assert!(!dedup.contains(&AccountName::new("bob"), "b1"));
        assert_eq!(h.ctx.locks().inspect().await.unwrap().unwrap().holder, other);
    }

    #[tokio::test(start_paused = true)]
    async fn items_are_enriched_with_current_content() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice"]);
        h.remote.post("alice", "hello", ago(60));
        PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();
        h.remote
            .edit_content("alice", "hello", "Hello, edited", "new   body");

        let view = rendered(ViewerAggregator::new(h.ctx.clone()).open().await.unwrap());
        let item = &view.sections[0].items[0];
        assert_eq!(item.title, "Hello, edited");
        assert_eq!(item.excerpt, "new body");
        assert_eq!(h.remote.calls(Method::Content), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn content_failure_falls_back_to_history() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice"]);
        h.remote.post("alice", "hello", ago(60));
        PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();
        h.remote.fail_next(Method::Content, RemoteError::decode("get_content", "gone"), 1);

        let view = rendered(ViewerAggregator::new(h.ctx.clone()).open().await.unwrap());
        assert_eq!(view.item_count(), 1);
        assert_eq!(view.sections[0].items[0].title, "hello title");
    }

    #[tokio::test(start_paused = true)]
    async fn scan_failure_keeps_entry_pending() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice"]);
        h.remote.post("alice", "hello", ago(60));
        PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();
        h.remote.fail_next(
            Method::AccountHistory,
            RemoteError::Rpc {
                code: -32000,
                message: "node error".into(),
            },
            1,
        );

        let view = rendered(ViewerAggregator::new(h.ctx.clone()).open().await.unwrap());
        assert!(view.sections[0].incomplete);

        let ledger = h.ctx.ledgers().load().await.unwrap();
        assert!(ledger.get(&AccountName::new("alice")).is_some());
        assert!(h.ctx.locks().inspect().await.unwrap().is_none());

        let retry = rendered(ViewerAggregator::new(h.ctx.clone()).open().await.unwrap());
        assert_eq!(retry.item_count(), 1);
        assert!(h.ctx.ledgers().load().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn viewer_preempts_running_poller() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice"]);
        let poller = Holder::new(HolderKind::Poller, InstanceId::from_ulid(Ulid::new()));
        assert!(
            h.ctx
                .locks()
                .acquire(&poller, 1, Duration::from_secs(120), Duration::ZERO)
                .await
                .unwrap()
        );

        let outcome = ViewerAggregator::new(h.ctx.clone()).open().await.unwrap();
        assert!(matches!(outcome, ViewOutcome::Rendered(_)));
        assert!(h.ctx.locks().inspect().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn busy_when_another_viewer_holds_the_lock() {
        let mut tuning = Tuning::default();
        tuning.lock.viewer_max_wait_secs = 20;
        let h = harness(tuning);
        h.remote.follow("observer", &["alice"]);
        let other = Holder::new(HolderKind::Viewer, InstanceId::from_ulid(Ulid::new()));
        assert!(
            h.ctx
                .locks()
                .acquire(&other, 2, Duration::from_secs(120), Duration::ZERO)
                .await
                .unwrap()
        );

        let outcome = ViewerAggregator::new(h.ctx.clone()).open().await.unwrap();
        assert_eq!(outcome, ViewOutcome::Busy);

        let poll = PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();
        assert_eq!(poll.outcome, CycleOutcome::LockBusy);
    }
}
