//! Tracked set: the observer's follow list.

use std::collections::BTreeSet;

use tracing::debug;

use crate::backoff::BackoffPolicy;
use crate::domain::{AccountName, RemoteError};
use crate::ports::RemoteApi;

pub const DEFAULT_FOLLOW_PAGE: u32 = 100;

/// Followed accounts in follow-list order, plus a set for membership tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedSet {
    entities: Vec<AccountName>,
    set: BTreeSet<AccountName>,
}

impl TrackedSet {
    pub fn entities(&self) -> &[AccountName] {
        &self.entities
    }

    pub fn set(&self) -> &BTreeSet<AccountName> {
        &self.set
    }

    pub fn contains(&self, entity: &AccountName) -> bool {
        self.set.contains(entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn push(&mut self, entity: AccountName) {
        if self.set.insert(entity.clone()) {
            self.entities.push(entity);
        }
    }
}

impl FromIterator<AccountName> for TrackedSet {
    fn from_iter<I: IntoIterator<Item = AccountName>>(iter: I) -> Self {
        let mut tracked = TrackedSet::default();
        for entity in iter {
            tracked.push(entity);
        }
        tracked
    }
}

/// Fetch the full follow list of `observer`, page by page.
///
/// Later pages start at the previous page's last row, which is skipped.
/// Mutes are not tracked.
pub async fn fetch_tracked_set(
    remote: &dyn RemoteApi,
    backoff: &BackoffPolicy,
    observer: &AccountName,
    page_size: u32,
) -> Result<TrackedSet, RemoteError> {
    let page_size = page_size.max(2);
    let mut tracked = TrackedSet::default();
    let mut start: Option<AccountName> = None;
    loop {
        let page = backoff
            .run("following", || {
                remote.following(observer, start.as_ref(), page_size)
            })
            .await?;
        let fetched = page.len();
        let skip = usize::from(start.is_some());
        let last = page.last().map(|row| row.following.clone());
        for row in page.into_iter().skip(skip) {
            if row.is_follow() {
                tracked.push(row.following);
            }
        }
        if fetched < page_size as usize || last == start {
            break;
        }
        start = last;
    }
    debug!(%observer, tracked = tracked.len(), "fetched follow list");
    Ok(tracked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{Method, ScriptedRemote};

    #[tokio::test]
    async fn pages_through_follows_skipping_repeats_and_mutes() {
        let remote = ScriptedRemote::new();
        remote.follow("observer", &["alice", "bob", "carol", "dave", "erin"]);
        remote.mute("observer", "mallory");

        let tracked = fetch_tracked_set(
            &remote,
            &BackoffPolicy::default(),
            &AccountName::new("observer"),
            2,
        )
        .await
        .unwrap();

        let names: Vec<&str> = tracked.entities().iter().map(|a| a.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol", "dave", "erin"]);
        assert!(!tracked.contains(&AccountName::new("mallory")));
        assert!(remote.calls(Method::Following) >= 3);
    }

    #[tokio::test]
    async fn empty_follow_list() {
        let remote = ScriptedRemote::new();
        remote.add_account("observer");
        let tracked = fetch_tracked_set(
            &remote,
            &BackoffPolicy::default(),
            &AccountName::new("observer"),
            DEFAULT_FOLLOW_PAGE,
        )
        .await
        .unwrap();
        assert!(tracked.is_empty());
    }

    #[tokio::test]
    async fn non_retryable_failure_propagates() {
        let remote = ScriptedRemote::new();
        remote.fail_next(Method::Following, RemoteError::decode("get_following", "bad row"), 1);
        let result = fetch_tracked_set(
            &remote,
            &BackoffPolicy::default(),
            &AccountName::new("observer"),
            DEFAULT_FOLLOW_PAGE,
        )
        .await;
        assert!(result.is_err());
    }
}
