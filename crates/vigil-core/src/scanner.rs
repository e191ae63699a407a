//! Scanner - エンティティの履歴を新しい方から固定サイズのページで遡る
//!
//! # ページごとの終了条件（先に当たったものが優先）
//! 1. `since` 以前のエントリに到達 → exhausted
//! 2. ページが `page_size` より短い（履歴の先頭に到達） → exhausted
//! 3. Backoff の予算を使い切ってもページ取得が失敗 → それまでの結果 + error
//!
//! `scan` は viewer 用のフルスキャンで、Dedup Table を更新します。
//! `probe` は poller 用の軽いスキャンで、`since` より新しい投稿系の操作を
//! 1 つ見つけた時点で止まり、Dedup Table には触れません。

use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::dedup::DedupTable;
use crate::domain::{AccountName, ClassifiedItem, HistoryEntry, ItemKind, Operation, RemoteError};
use crate::ports::RemoteApi;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Result of a full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub posts: Vec<ClassifiedItem>,
    pub comments: Vec<ClassifiedItem>,
    pub replies: Vec<ClassifiedItem>,
    /// History index just before the oldest processed entry.
    pub new_cursor: Option<u64>,
    /// The walk reached `since` or the start of the history.
    pub exhausted: bool,
    /// Page fetch failure that ended the walk early.
    pub error: Option<RemoteError>,
    /// Newest non-edit comment-shaped entry newer than `since`, duplicates included.
    pub newest_activity: Option<DateTime<Utc>>,
}

impl ScanReport {
    pub fn len(&self) -> usize {
        self.posts.len() + self.comments.len() + self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All items, newest first.
    pub fn items(&self) -> Vec<&ClassifiedItem> {
        let mut items: Vec<&ClassifiedItem> = self
            .posts
            .iter()
            .chain(&self.comments)
            .chain(&self.replies)
            .collect();
        items.sort_by(|a, b| b.index.cmp(&a.index));
        items
    }
}

/// Result of a probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Timestamp of the newest activity found, if any.
    pub newest_activity: Option<DateTime<Utc>>,
    pub new_cursor: Option<u64>,
    pub exhausted: bool,
    pub error: Option<RemoteError>,
    pub pages: u32,
}

impl ProbeReport {
    /// The page budget ran out before reaching `since` or any activity.
    pub fn is_suspended(&self) -> bool {
        self.newest_activity.is_none() && !self.exhausted && self.error.is_none()
    }
}

#[derive(Debug, Default)]
struct Walk {
    new_cursor: Option<u64>,
    exhausted: bool,
    error: Option<RemoteError>,
    pages: u32,
}

pub struct Scanner {
    remote: Arc<dyn RemoteApi>,
    backoff: BackoffPolicy,
    page_size: u32,
}

impl Scanner {
    pub fn new(remote: Arc<dyn RemoteApi>, backoff: BackoffPolicy, page_size: u32) -> Self {
        Self {
            remote,
            backoff,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Full scan of `entity`'s history newer than `since`, keeping only items
    /// the dedup table has not seen.
    pub async fn scan(
        &self,
        entity: &AccountName,
        since: DateTime<Utc>,
        resume_cursor: Option<u64>,
        dedup: &mut DedupTable,
    ) -> ScanReport {
        let mut report = ScanReport::default();
        let walk = self
            .walk(entity, since, resume_cursor, None, |entry| {
                let Operation::Comment(op) = &entry.op else {
                    return ControlFlow::Continue(());
                };
                if op.is_edit() {
                    return ControlFlow::Continue(());
                }
                report.newest_activity = report.newest_activity.max(Some(entry.timestamp));
                if !dedup.is_new(&op.author, &op.permlink) {
                    return ControlFlow::Continue(());
                }
                let kind = ItemKind::classify(entity, op);
                let item = ClassifiedItem::from_history(kind, op, entry);
                match kind {
                    ItemKind::Post => report.posts.push(item),
                    ItemKind::Comment => report.comments.push(item),
                    ItemKind::Reply => report.replies.push(item),
                }
                ControlFlow::Continue(())
            })
            .await;
        report.new_cursor = walk.new_cursor;
        report.exhausted = walk.exhausted;
        report.error = walk.error;
        debug!(
            %entity,
            items = report.len(),
            pages = walk.pages,
            exhausted = report.exhausted,
            "scan finished"
        );
        report
    }

    /// Look for any activity newer than `since`, reading at most `max_pages` pages.
    pub async fn probe(
        &self,
        entity: &AccountName,
        since: DateTime<Utc>,
        resume_cursor: Option<u64>,
        max_pages: u32,
    ) -> ProbeReport {
        let mut newest_activity = None;
        let walk = self
            .walk(entity, since, resume_cursor, Some(max_pages), |entry| {
                match &entry.op {
                    Operation::Comment(op) if !op.is_edit() => {
                        newest_activity = Some(entry.timestamp);
                        ControlFlow::Break(())
                    }
                    _ => ControlFlow::Continue(()),
                }
            })
            .await;
        ProbeReport {
            newest_activity,
            new_cursor: walk.new_cursor,
            exhausted: walk.exhausted,
            error: walk.error,
            pages: walk.pages,
        }
    }

    /// Walk pages backwards from `cursor`, feeding entries newer than `since`
    /// to `visit`, newest first.
    async fn walk<F>(
        &self,
        entity: &AccountName,
        since: DateTime<Utc>,
        cursor: Option<u64>,
        max_pages: Option<u32>,
        mut visit: F,
    ) -> Walk
    where
        F: FnMut(&HistoryEntry) -> ControlFlow<()>,
    {
        let mut walk = Walk {
            new_cursor: cursor,
            ..Walk::default()
        };
        let mut cursor = cursor;
        loop {
            if max_pages.is_some_and(|max| walk.pages >= max) {
                debug!(%entity, pages = walk.pages, "page budget spent");
                return walk;
            }
            let page = self
                .backoff
                .run("account_history", || {
                    self.remote.account_history(entity, cursor, self.page_size)
                })
                .await;
            let page = match page {
                Ok(page) => page,
                Err(err) => {
                    warn!(%entity, ?cursor, error = %err, "history page failed");
                    walk.error = Some(err);
                    return walk;
                }
            };
            walk.pages += 1;

            for entry in page.iter().rev() {
                if entry.timestamp <= since {
                    walk.exhausted = true;
                    return walk;
                }
                walk.new_cursor = entry.index.checked_sub(1);
                if visit(entry).is_break() {
                    return walk;
                }
            }

            let oldest = page.first().map(|entry| entry.index);
            match oldest {
                Some(oldest) if oldest > 0 && page.len() >= self.page_size as usize => {
                    cursor = Some(oldest - 1);
                }
                _ => {
                    walk.exhausted = true;
                    return walk;
                }
            }
        }
    }
}
