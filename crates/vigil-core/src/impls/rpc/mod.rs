//! RpcClient - reqwest による JSON-RPC 2.0 クライアント
//!
//! エラーの分類:
//! - HTTP 429 / `rate_limit_code` → `RemoteError::RateLimited`
//! - 接続失敗・タイムアウト・5xx → `RemoteError::Transport`
//! - それ以外の JSON-RPC エラー → `RemoteError::Rpc`
//! - 形の合わないレスポンス → `RemoteError::Decode`

mod wire;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::domain::{AccountName, Content, FollowRow, HistoryEntry, RemoteError};
use crate::ports::RemoteApi;

use self::wire::{RpcReply, RpcRequest, RpcResponse};

pub const DEFAULT_RATE_LIMIT_CODE: i64 = -32003;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const GET_ACCOUNT_HISTORY: &str = "condenser_api.get_account_history";
const GET_CONTENT: &str = "condenser_api.get_content";
const GET_FOLLOWING: &str = "condenser_api.get_following";
const GET_ACCOUNTS: &str = "condenser_api.get_accounts";

pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
    rate_limit_code: i64,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(http, endpoint))
    }

    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            rate_limit_code: DEFAULT_RATE_LIMIT_CODE,
            next_id: AtomicU64::new(1),
        }
    }

    /// Error code the node uses for throttling.
    pub fn rate_limit_code(mut self, code: i64) -> Self {
        self.rate_limit_code = code;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "rpc call");
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        let response = self.http.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(RemoteError::RateLimited {
                code: 429,
                message: status.to_string(),
            });
        }
        if status.is_server_error() {
            return Err(RemoteError::Transport(format!("{method}: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(RemoteError::Rpc {
                code: i64::from(status.as_u16()),
                message: format!("{method}: HTTP {status}"),
            });
        }

        let bytes = response.bytes().await?;
        let body: RpcResponse = serde_json::from_slice(&bytes)
            .map_err(|e| RemoteError::decode(method, e.to_string()))?;
        match body.into_reply(method)? {
            RpcReply::Result(result) => Ok(result),
            RpcReply::Error(error) if error.code == self.rate_limit_code => {
                Err(RemoteError::RateLimited {
                    code: error.code,
                    message: error.message,
                })
            }
            RpcReply::Error(error) => Err(RemoteError::Rpc {
                code: error.code,
                message: error.message,
            }),
        }
    }
}

#[async_trait]
impl RemoteApi for RpcClient {
    async fn account_history(
        &self,
        account: &AccountName,
        from: Option<u64>,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, RemoteError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        // The node returns `limit + 1` entries ending at `from`, and rejects a
        // limit larger than `from`.
        let node_limit = u64::from(limit - 1);
        let (start, node_limit) = match from {
            None => (json!(-1), node_limit),
            Some(from) => (json!(from), node_limit.min(from)),
        };
        let result = self
            .call(
                GET_ACCOUNT_HISTORY,
                json!([account.as_str(), start, node_limit]),
            )
            .await?;
        let mut entries = wire::decode_history(GET_ACCOUNT_HISTORY, result)?;
        if let Some(from) = from {
            entries.retain(|e| e.index <= from);
        }
        let excess = entries.len().saturating_sub(limit as usize);
        entries.drain(..excess);
        Ok(entries)
    }

    async fn content(&self, author: &AccountName, permlink: &str) -> Result<Content, RemoteError> {
        let result = self
            .call(GET_CONTENT, json!([author.as_str(), permlink]))
            .await?;
        wire::decode_content(GET_CONTENT, result)
    }

    async fn following(
        &self,
        observer: &AccountName,
        start: Option<&AccountName>,
        limit: u32,
    ) -> Result<Vec<FollowRow>, RemoteError> {
        let start = start.map(AccountName::as_str).unwrap_or_default();
        let result = self
            .call(
                GET_FOLLOWING,
                json!([observer.as_str(), start, "blog", limit]),
            )
            .await?;
        wire::decode_following(GET_FOLLOWING, result)
    }

    async fn account_exists(&self, account: &AccountName) -> Result<bool, RemoteError> {
        let result = self.call(GET_ACCOUNTS, json!([[account.as_str()]])).await?;
        Ok(wire::decode_accounts(GET_ACCOUNTS, result)? > 0)
    }
}
