//! RemoteApi port - チェーンの JSON-RPC API
//!
//! 実装:
//! - `impls::RpcClient`: reqwest による本番実装
//! - `impls::ScriptedRemote`: テスト用のインメモリ実装（失敗の注入が可能）

use async_trait::async_trait;

use crate::domain::{AccountName, Content, FollowRow, HistoryEntry, RemoteError};

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// A page of `account`'s history ending at `from` (the newest entry when
    /// `None`), at most `limit` entries, ascending by index.
    async fn account_history(
        &self,
        account: &AccountName,
        from: Option<u64>,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, RemoteError>;

    /// Current content of `author/permlink`.
    async fn content(&self, author: &AccountName, permlink: &str) -> Result<Content, RemoteError>;

    /// A page of `observer`'s follow list starting at `start` (inclusive).
    async fn following(
        &self,
        observer: &AccountName,
        start: Option<&AccountName>,
        limit: u32,
    ) -> Result<Vec<FollowRow>, RemoteError>;

    async fn account_exists(&self, account: &AccountName) -> Result<bool, RemoteError>;
}
