//! ScriptedRemote - 開発・テスト用のインメモリ RemoteApi
//!
//! 小さなチェーンを模倣します。comment を積むと author の履歴と
//! parent author の履歴の両方に入ります（本物のチェーンと同じ）。
//! `fail_next` で任意のメソッドに失敗を注入できます。

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AccountName, CommentOp, Content, FollowRow, HistoryEntry, Operation, RemoteError,
};
use crate::ports::RemoteApi;

/// Remote methods, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    AccountHistory,
    Content,
    Following,
    AccountExists,
}

#[derive(Default)]
struct ChainState {
    histories: HashMap<AccountName, Vec<HistoryEntry>>,
    contents: HashMap<(AccountName, String), Content>,
    follows: HashMap<AccountName, BTreeMap<AccountName, FollowRow>>,
    accounts: HashSet<AccountName>,
    /// Per-method script: `None` lets a call through, `Some` fails it.
    failures: HashMap<Method, VecDeque<Option<RemoteError>>>,
    calls: HashMap<Method, usize>,
}

impl ChainState {
    fn append(&mut self, account: &AccountName, timestamp: DateTime<Utc>, op: Operation) -> u64 {
        self.accounts.insert(account.clone());
        let history = self.histories.entry(account.clone()).or_default();
        let index = history.last().map_or(0, |e| e.index + 1);
        history.push(HistoryEntry {
            index,
            timestamp,
            op,
        });
        index
    }

    fn enter(&mut self, method: Method) -> Result<(), RemoteError> {
        *self.calls.entry(method).or_default() += 1;
        match self.failures.get_mut(&method).and_then(VecDeque::pop_front) {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct ScriptedRemote {
    state: Mutex<ChainState>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_account(&self, name: &str) {
        self.state().accounts.insert(AccountName::new(name));
    }

    /// `observer` follows each of `accounts`.
    pub fn follow(&self, observer: &str, accounts: &[&str]) {
        let observer = AccountName::new(observer);
        let mut state = self.state();
        state.accounts.insert(observer.clone());
        for account in accounts {
            let following = AccountName::new(account);
            state.accounts.insert(following.clone());
            state.follows.entry(observer.clone()).or_default().insert(
                following.clone(),
                FollowRow {
                    follower: observer.clone(),
                    following,
                    what: vec!["blog".to_string()],
                },
            );
        }
    }

    /// `observer` mutes `account`.
    pub fn mute(&self, observer: &str, account: &str) {
        let observer = AccountName::new(observer);
        let following = AccountName::new(account);
        self.state().follows.entry(observer.clone()).or_default().insert(
            following.clone(),
            FollowRow {
                follower: observer,
                following,
                what: vec!["ignore".to_string()],
            },
        );
    }

    /// Publish a comment operation. Returns the index in the author's history.
    pub fn publish(&self, op: CommentOp, timestamp: DateTime<Utc>) -> u64 {
        let mut state = self.state();
        let author = op.author.clone();
        let parent = (!op.parent_author.is_empty()).then(|| AccountName::new(&op.parent_author));
        if !op.is_edit() {
            state.contents.insert(
                (author.clone(), op.permlink.clone()),
                Content {
                    author: author.clone(),
                    permlink: op.permlink.clone(),
                    parent_author: op.parent_author.clone(),
                    title: op.title.clone(),
                    body: op.body.clone(),
                    created: timestamp,
                },
            );
        }
        let index = state.append(&author, timestamp, Operation::Comment(op.clone()));
        if let Some(parent) = parent
            && parent != author
        {
            state.append(&parent, timestamp, Operation::Comment(op));
        }
        index
    }

    /// Root post by `author`.
    pub fn post(&self, author: &str, permlink: &str, timestamp: DateTime<Utc>) -> u64 {
        self.publish(
            CommentOp {
                parent_author: String::new(),
                parent_permlink: "general".to_string(),
                author: AccountName::new(author),
                permlink: permlink.to_string(),
                title: format!("{permlink} title"),
                body: format!("{permlink} body"),
            },
            timestamp,
        )
    }

    /// Reply by `author` to `parent_author/parent_permlink`.
    pub fn reply(
        &self,
        author: &str,
        parent_author: &str,
        parent_permlink: &str,
        permlink: &str,
        timestamp: DateTime<Utc>,
    ) -> u64 {
        self.publish(
            CommentOp {
                parent_author: parent_author.to_string(),
                parent_permlink: parent_permlink.to_string(),
                author: AccountName::new(author),
                permlink: permlink.to_string(),
                title: String::new(),
                body: format!("{author} says hi"),
            },
            timestamp,
        )
    }

    /// Change the current content of `author/permlink` without a history entry.
    pub fn edit_content(&self, author: &str, permlink: &str, title: &str, body: &str) {
        let key = (AccountName::new(author), permlink.to_string());
        if let Some(content) = self.state().contents.get_mut(&key) {
            content.title = title.to_string();
            content.body = body.to_string();
        }
    }

    /// Any non-comment operation (a vote, a transfer, ...).
    pub fn other(&self, account: &str, name: &str, timestamp: DateTime<Utc>) -> u64 {
        self.state().append(
            &AccountName::new(account),
            timestamp,
            Operation::Other(name.to_string()),
        )
    }

    /// Make the next `times` calls of `method` fail with `err`.
    pub fn fail_next(&self, method: Method, err: RemoteError, times: usize) {
        self.fail_after(method, 0, err, times);
    }

    /// Let `ok_calls` calls of `method` through, then fail `times` calls.
    pub fn fail_after(&self, method: Method, ok_calls: usize, err: RemoteError, times: usize) {
        let mut state = self.state();
        let queue = state.failures.entry(method).or_default();
        queue.extend(std::iter::repeat_n(None, ok_calls));
        queue.extend(std::iter::repeat_n(Some(err), times));
    }

    pub fn calls(&self, method: Method) -> usize {
        self.state().calls.get(&method).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn account_history(
        &self,
        account: &AccountName,
        from: Option<u64>,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, RemoteError> {
        let mut state = self.state();
        state.enter(Method::AccountHistory)?;
        let Some(history) = state.histories.get(account) else {
            return Ok(Vec::new());
        };
        let upto: Vec<&HistoryEntry> = history
            .iter()
            .filter(|e| from.is_none_or(|from| e.index <= from))
            .collect();
        let skip = upto.len().saturating_sub(limit as usize);
        Ok(upto.into_iter().skip(skip).cloned().collect())
    }

    async fn content(&self, author: &AccountName, permlink: &str) -> Result<Content, RemoteError> {
        let mut state = self.state();
        state.enter(Method::Content)?;
        state
            .contents
            .get(&(author.clone(), permlink.to_string()))
            .cloned()
            .ok_or_else(|| RemoteError::decode("get_content", format!("no content {author}/{permlink}")))
    }

    async fn following(
        &self,
        observer: &AccountName,
        start: Option<&AccountName>,
        limit: u32,
    ) -> Result<Vec<FollowRow>, RemoteError> {
        let mut state = self.state();
        state.enter(Method::Following)?;
        let Some(rows) = state.follows.get(observer) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .values()
            .filter(|row| start.is_none_or(|start| row.following >= *start))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn account_exists(&self, account: &AccountName) -> Result<bool, RemoteError> {
        let mut state = self.state();
        state.enter(Method::AccountExists)?;
        Ok(state.accounts.contains(account))
    }
}
