//! PollOrchestrator - タイマー駆動のバックグラウンド poll
//!
//! # 状態遷移
//! ```text
//! Idle → AcquiringLock → Scanning ⇄ Checkpointing → Notifying → Releasing → Idle
//! ```
//! - ロックが取れなければそのまま Idle（次の tick で再挑戦）
//! - `checkpoint_every` エンティティごとに Checkpointing でロックを refresh し、
//!   ledger と checkpoint を保存する
//! - refresh に失敗したら LockLost: checkpoint を 0 に戻して Idle（保存はしない）
//! - 1 エンティティのページ予算を使い切ったら、その位置を保存して cycle を中断

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::app::AppContext;
use crate::config::Settings;
use crate::domain::{
    AccountName, CycleId, DisplayMarks, Holder, HolderKind, Ledger, Result, ScanCheckpoint,
    VigilError,
};
use crate::follows::{TrackedSet, fetch_tracked_set};
use crate::ledger::since_for;

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    AcquiringLock,
    Scanning,
    Checkpointing,
    Notifying,
    Releasing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every tracked entity was probed.
    Completed,
    /// Stopped inside the entity at `index`; the next cycle resumes there.
    Suspended { index: usize },
    /// Another holder has the lock.
    LockBusy,
    /// The lock was taken over mid-cycle.
    LockLost,
    /// Settings, observer or follow list unavailable.
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: CycleId,
    pub outcome: CycleOutcome,
    /// Entities probed this cycle.
    pub scanned: usize,
    /// Entities whose ledger entry is new or moved forward.
    pub changed: usize,
    /// Entities skipped on a remote error.
    pub skipped: usize,
}

/// Mutable state of one cycle.
struct CycleRun {
    settings: Settings,
    holder: Holder,
    tracked: Option<TrackedSet>,
    ledger: Ledger,
    marks: DisplayMarks,
    marks_pruned: bool,
    checkpoint: ScanCheckpoint,
    /// Index of the next entity to probe.
    next: usize,
    /// Entities probed since the last checkpoint.
    since_checkpoint: usize,
    suspended: Option<(usize, Option<u64>)>,
    scanned: usize,
    changed: usize,
    skipped: usize,
    outcome: Option<CycleOutcome>,
}

impl CycleRun {
    fn new(settings: Settings, holder: Holder) -> Self {
        Self {
            settings,
            holder,
            tracked: None,
            ledger: Ledger::new(),
            marks: DisplayMarks::default(),
            marks_pruned: false,
            checkpoint: ScanCheckpoint::default(),
            next: 0,
            since_checkpoint: 0,
            suspended: None,
            scanned: 0,
            changed: 0,
            skipped: 0,
            outcome: None,
        }
    }

    fn observer(&self) -> &AccountName {
        &self.settings.observer
    }

    fn remaining(&self) -> bool {
        self.tracked
            .as_ref()
            .is_some_and(|tracked| self.next < tracked.len())
    }
}

pub struct PollOrchestrator {
    ctx: AppContext,
    instance: Holder,
    state: watch::Sender<PollState>,
}

impl PollOrchestrator {
    pub fn new(ctx: AppContext) -> Self {
        let instance = Holder::new(HolderKind::Poller, ctx.ids.instance_id());
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            ctx,
            instance,
            state,
        }
    }

    pub fn holder(&self) -> &Holder {
        &self.instance
    }

    /// Follow state transitions.
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    fn enter(&self, next: PollState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "poll state");
        }
    }

    /// Run one cycle.
    ///
    /// Contention and remote trouble end up in the report's outcome; only
    /// Durable Store failures are returned as errors.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle = self.ctx.ids.cycle_id();
        let span = info_span!("poll_cycle", %cycle);
        self.cycle(cycle).instrument(span).await
    }

    async fn cycle(&self, cycle: CycleId) -> Result<CycleReport> {
        let mut report = CycleReport {
            cycle,
            outcome: CycleOutcome::Completed,
            scanned: 0,
            changed: 0,
            skipped: 0,
        };
        let settings = match self.prepare().await {
            Ok(settings) => settings,
            Err(reason) => {
                warn!(%reason, "cycle aborted");
                report.outcome = CycleOutcome::Aborted(reason);
                return Ok(report);
            }
        };

        let mut run = CycleRun::new(settings, self.instance);
        let driven = self.drive(&mut run).await;
        self.enter(PollState::Idle);
        if let Err(err) = driven {
            if let Err(release_err) = self.ctx.locks().release(&run.holder).await {
                warn!(error = %release_err, "release after failure also failed");
            }
            return Err(err);
        }

        report.outcome = run.outcome.unwrap_or(CycleOutcome::Completed);
        report.scanned = run.scanned;
        report.changed = run.changed;
        report.skipped = run.skipped;
        info!(
            outcome = ?report.outcome,
            scanned = report.scanned,
            changed = report.changed,
            skipped = report.skipped,
            "poll cycle finished"
        );
        Ok(report)
    }

    /// Re-read settings and make sure the observer exists.
    async fn prepare(&self) -> std::result::Result<Settings, String> {
        let settings = self.ctx.settings.load().await.map_err(|e| e.to_string())?;
        let observer = settings.observer.clone();
        let exists = self
            .ctx
            .backoff()
            .run("account_exists", || self.ctx.remote.account_exists(&observer))
            .await
            .map_err(|e| e.to_string())?;
        if !exists {
            return Err(VigilError::ObserverNotFound(observer).to_string());
        }
        Ok(settings)
    }

    async fn drive(&self, run: &mut CycleRun) -> Result<()> {
        let mut state = PollState::AcquiringLock;
        loop {
            self.enter(state);
            state = match state {
                PollState::Idle => return Ok(()),
                PollState::AcquiringLock => self.acquire(run).await?,
                PollState::Scanning => self.scan(run).await?,
                PollState::Checkpointing => self.checkpoint(run).await?,
                PollState::Notifying => self.notify(run).await,
                PollState::Releasing => self.release(run).await?,
            };
        }
    }

    async fn acquire(&self, run: &mut CycleRun) -> Result<PollState> {
        let lock = &self.ctx.tuning.lock;
        let acquired = self
            .ctx
            .locks()
            .acquire(
                &run.holder,
                HolderKind::Poller.priority(),
                lock.stale_after(),
                lock.poller_max_wait(),
            )
            .await?;
        if acquired {
            Ok(PollState::Scanning)
        } else {
            info!("lock busy, skipping cycle");
            run.outcome = Some(CycleOutcome::LockBusy);
            Ok(PollState::Idle)
        }
    }

    /// Load the follow list and local state on first entry.
    async fn load(&self, run: &mut CycleRun) -> Result<bool> {
        let tracked = match fetch_tracked_set(
            self.ctx.remote.as_ref(),
            &self.ctx.backoff(),
            run.observer(),
            self.ctx.tuning.follow_page,
        )
        .await
        {
            Ok(tracked) => tracked,
            Err(err) => {
                warn!(error = %err, "follow list unavailable");
                run.outcome = Some(CycleOutcome::Aborted(format!("follow list: {err}")));
                return Ok(false);
            }
        };

        let ledgers = self.ctx.ledgers();
        run.ledger = ledgers.load().await?;
        run.marks = ledgers.load_marks().await?;
        let pruned = run.ledger.prune(tracked.set());
        let pruned_marks = run.marks.prune(tracked.set());
        run.marks_pruned = pruned_marks > 0;
        if pruned + pruned_marks > 0 {
            debug!(pruned, pruned_marks, "dropped untracked entities");
        }

        run.checkpoint = self.ctx.checkpoints().load(run.observer()).await?;
        if run.checkpoint.index >= tracked.len() {
            run.checkpoint = ScanCheckpoint::start(run.observer().clone());
        }
        run.next = run.checkpoint.index;
        info!(
            tracked = tracked.len(),
            from = run.next,
            resume_cursor = ?run.checkpoint.resume_cursor,
            "scanning follow list"
        );
        run.tracked = Some(tracked);
        Ok(true)
    }

    async fn scan(&self, run: &mut CycleRun) -> Result<PollState> {
        if run.tracked.is_none() && !self.load(run).await? {
            return Ok(PollState::Releasing);
        }
        let tuning = &self.ctx.tuning;
        let scanner = self.ctx.scanner();
        let fallback = self.ctx.clock.now() - tuning.lookback();
        // clone the batch, not the whole follow list
        let batch: Vec<AccountName> = run
            .tracked
            .as_ref()
            .map(|tracked| {
                let entities = tracked.entities();
                let start = run.next.min(entities.len());
                let room = tuning.checkpoint_every.saturating_sub(run.since_checkpoint);
                let end = start.saturating_add(room).min(entities.len());
                entities[start..end].to_vec()
            })
            .unwrap_or_default();

        for entity in &batch {
            let index = run.next;
            let since = since_for(&run.ledger, &run.marks, entity, fallback);
            let probe = scanner
                .probe(
                    entity,
                    since,
                    run.checkpoint.cursor_for(index),
                    tuning.max_pages_per_entity,
                )
                .await;
            run.scanned += 1;
            run.since_checkpoint += 1;

            if let Some(observed) = probe.newest_activity {
                if run.ledger.merge_activity(entity, observed) {
                    debug!(%entity, %observed, "new activity");
                    run.changed += 1;
                }
            } else if let Some(err) = &probe.error {
                warn!(%entity, error = %err, "skipping entity");
                run.skipped += 1;
            } else if probe.is_suspended() {
                info!(%entity, index, cursor = ?probe.new_cursor, "page budget spent, suspending");
                run.suspended = Some((index, probe.new_cursor));
                return Ok(PollState::Checkpointing);
            }
            run.next += 1;
        }
        Ok(PollState::Checkpointing)
    }

    async fn checkpoint(&self, run: &mut CycleRun) -> Result<PollState> {
        let locks = self.ctx.locks();
        if !locks.refresh(&run.holder).await? {
            warn!("lock lost, dropping this cycle's progress");
            self.ctx.checkpoints().reset().await?;
            run.outcome = Some(CycleOutcome::LockLost);
            return Ok(PollState::Idle);
        }

        let now = self.ctx.clock.now();
        let done = match run.suspended {
            Some((index, cursor)) => {
                run.checkpoint.suspend_at(index, cursor, now);
                run.outcome = Some(CycleOutcome::Suspended { index });
                true
            }
            None if !run.remaining() => {
                run.checkpoint.reset(now);
                true
            }
            None => {
                run.checkpoint.advance_to(run.next, now);
                false
            }
        };
        self.persist(run).await?;
        run.since_checkpoint = 0;

        Ok(if done {
            PollState::Notifying
        } else {
            PollState::Scanning
        })
    }

    async fn persist(&self, run: &mut CycleRun) -> Result<()> {
        let ledgers = self.ctx.ledgers();
        ledgers.save(&run.ledger).await?;
        if run.marks_pruned {
            ledgers.save_marks(&run.marks).await?;
            run.marks_pruned = false;
        }
        self.ctx.checkpoints().save(&run.checkpoint).await?;
        Ok(())
    }

    async fn notify(&self, run: &mut CycleRun) -> PollState {
        if run.changed > 0 {
            let message = activity_message(run.changed);
            self.ctx.notifier.notify(&message).await;
        }
        PollState::Releasing
    }

    async fn release(&self, run: &mut CycleRun) -> Result<PollState> {
        if !self.ctx.locks().release(&run.holder).await? {
            warn!("lock was no longer ours at release");
        }
        Ok(PollState::Idle)
    }
}

pub fn activity_message(changed: usize) -> String {
    match changed {
        1 => "1 followed account has new activity".to_string(),
        n => format!("{n} followed accounts have new activity"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::context::testing::{Harness, TakeLockOnHistory, ago, harness};
    use crate::config::Tuning;
    use crate::domain::{InstanceId, RemoteError};
    use crate::impls::Method;
    use crate::ports::{Clock, keys, load_json};
    use std::time::Duration;
    use ulid::Ulid;

    fn tuning(checkpoint_every: usize, max_pages: u32, page_size: u32) -> Tuning {
        Tuning {
            checkpoint_every,
            max_pages_per_entity: max_pages,
            page_size,
            ..Tuning::default()
        }
    }

    async fn stored_checkpoint(h: &Harness) -> ScanCheckpoint {
        load_json(h.store.as_ref(), keys::CHECKPOINT)
            .await
            .unwrap()
            .unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn completed_cycle_notifies_once_with_changed_count() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice", "bob", "carol"]);
        h.remote.post("alice", "a1", ago(600));
        h.remote.post("bob", "b1", ago(300));
        h.remote.other("carol", "vote", ago(100));

        let poller = PollOrchestrator::new(h.ctx.clone());
        let report = poller.run_cycle().await.unwrap();

        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.scanned, 3);
        assert_eq!(report.changed, 2);
        assert_eq!(h.notifier.sent(), vec!["2 followed accounts have new activity"]);
        assert_eq!(stored_checkpoint(&h).await.index, 0);
        assert_eq!(*poller.subscribe().borrow(), PollState::Idle);

        let ledger = h.ctx.ledgers().load().await.unwrap();
        let alice = ledger.get(&AccountName::new("alice")).unwrap();
        assert_eq!(alice.activity_time, ago(600));
        assert_eq!(alice.last_display_time, ago(601));
        assert!(h.ctx.locks().inspect().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn second_cycle_without_new_activity_is_silent() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice"]);
        h.remote.post("alice", "a1", ago(600));
        let poller = PollOrchestrator::new(h.ctx.clone());

        poller.run_cycle().await.unwrap();
        let second = poller.run_cycle().await.unwrap();

        assert_eq!(second.changed, 0);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_older_than_lookback_is_ignored() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice"]);
        h.remote.post("alice", "ancient", ago(3 * 24 * 3600));

        let report = PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();
        assert_eq!(report.changed, 0);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn untracked_entities_are_pruned() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice"]);
        let mut ledger = Ledger::new();
        ledger.merge_activity(&AccountName::new("gone"), ago(50));
        h.ctx.ledgers().save(&ledger).await.unwrap();

        PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();

        let ledger = h.ctx.ledgers().load().await.unwrap();
        assert!(ledger.get(&AccountName::new("gone")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn busy_lock_skips_cycle() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice"]);
        let viewer = Holder::new(HolderKind::Viewer, InstanceId::from_ulid(Ulid::new()));
        assert!(
            h.ctx
                .locks()
                .acquire(&viewer, 2, Duration::from_secs(120), Duration::ZERO)
                .await
                .unwrap()
        );

        let report = PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::LockBusy);
        assert_eq!(report.scanned, 0);
        assert_eq!(h.ctx.locks().inspect().await.unwrap().unwrap().holder, viewer);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_observer_aborts() {
        let h = harness(Tuning::default());
        let report = PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();
        assert!(matches!(report.outcome, CycleOutcome::Aborted(ref reason) if reason.contains("observer")));
        assert_eq!(h.remote.calls(Method::Following), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn entity_errors_are_skipped() {
        let h = harness(Tuning::default());
        h.remote.follow("observer", &["alice", "bob"]);
        h.remote.post("bob", "b1", ago(10));
        h.remote.fail_next(
            Method::AccountHistory,
            RemoteError::decode("get_account_history", "garbled"),
            1,
        );

        let report = PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.changed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn page_budget_suspends_and_next_cycle_resumes() {
        let h = harness(tuning(10, 2, 2));
        h.remote.follow("observer", &["alice", "bob"]);
        h.remote.post("alice", "a1", ago(900));
        for i in 0..6 {
            h.remote.other("alice", "vote", ago(800 - i));
        }
        h.remote.post("bob", "b1", ago(100));
        let poller = PollOrchestrator::new(h.ctx.clone());

        let first = poller.run_cycle().await.unwrap();
        assert_eq!(first.outcome, CycleOutcome::Suspended { index: 0 });
        let cp = stored_checkpoint(&h).await;
        assert_eq!(cp.index, 0);
        assert_eq!(cp.resume_cursor, Some(2));
        assert!(h.ctx.locks().inspect().await.unwrap().is_none());

        let second = poller.run_cycle().await.unwrap();
        assert_eq!(second.outcome, CycleOutcome::Completed);
        assert_eq!(second.changed, 2);
        let ledger = h.ctx.ledgers().load().await.unwrap();
        assert_eq!(
            ledger.get(&AccountName::new("alice")).unwrap().activity_time,
            ago(900)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn batches_cover_the_whole_follow_list() {
        let h = harness(tuning(2, 20, 100));
        let names = ["alice", "bob", "carol", "dave", "erin"];
        h.remote.follow("observer", &names);
        for (i, name) in names.iter().enumerate() {
            h.remote.post(name, &format!("{name}-post"), ago(60 * (i as i64 + 1)));
        }

        let report = PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();

        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.scanned, 5);
        assert_eq!(report.changed, 5);
        assert_eq!(h.remote.calls(Method::AccountHistory), 5);
        assert_eq!(h.ctx.ledgers().load().await.unwrap().len(), 5);
        assert_eq!(stored_checkpoint(&h).await.index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn checkpoint_resumes_from_saved_index() {
        let h = harness(tuning(1, 20, 100));
        h.remote.follow("observer", &["alice", "bob", "carol"]);
        let mut cp = ScanCheckpoint::start(AccountName::new("observer"));
        cp.advance_to(2, h.clock.now());
        h.ctx.checkpoints().save(&cp).await.unwrap();

        let report = PollOrchestrator::new(h.ctx.clone()).run_cycle().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(h.remote.calls(Method::AccountHistory), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_lock_resets_checkpoint_and_leaves_viewer_holding() {
        let h = harness(tuning(1, 20, 100));
        h.remote.follow("observer", &["alice", "bob", "carol"]);
        h.remote.post("bob", "b1", ago(30));
        let viewer = Holder::new(HolderKind::Viewer, InstanceId::from_ulid(Ulid::new()));
        let mut ctx = h.ctx.clone();
        ctx.remote = Arc::new(TakeLockOnHistory {
            inner: h.remote.clone(),
            locks: h.ctx.locks(),
            taker: viewer,
            priority: HolderKind::Viewer.priority(),
            victim: AccountName::new("bob"),
        });

        let report = PollOrchestrator::new(ctx).run_cycle().await.unwrap();

        assert_eq!(report.outcome, CycleOutcome::LockLost);
        assert_eq!(report.scanned, 2);
        assert_eq!(stored_checkpoint(&h).await.index, 0);
        assert_eq!(h.ctx.locks().inspect().await.unwrap().unwrap().holder, viewer);
        assert!(h.notifier.sent().is_empty());
        // bob's activity was found after the lock was lost and is not persisted.
        let ledger = h.ctx.ledgers().load().await.unwrap();
        assert!(ledger.get(&AccountName::new("bob")).is_none());
    }

    #[test]
    fn message_counts_accounts() {
        assert_eq!(activity_message(1), "1 followed account has new activity");
        assert_eq!(activity_message(3), "3 followed accounts have new activity");
    }
}
