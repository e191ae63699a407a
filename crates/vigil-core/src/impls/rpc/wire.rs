//! Wire shapes of the JSON-RPC API and their decode into domain types.
//!
//! Every decode fails closed with `RemoteError::Decode` instead of reading
//! fields that are not there.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    AccountName, CommentOp, Content, FollowRow, HistoryEntry, Operation, RemoteError,
};

/// Chain timestamps carry no zone and are UTC.
const CHAIN_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: Value,
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorBody {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

/// A response reduced to one of its two legal variants.
#[derive(Debug)]
pub(crate) enum RpcReply {
    Result(Value),
    Error(RpcErrorBody),
}

impl RpcResponse {
    pub fn into_reply(self, method: &str) -> Result<RpcReply, RemoteError> {
        match (self.error, self.result) {
            (Some(error), _) => Ok(RpcReply::Error(error)),
            (None, Some(result)) => Ok(RpcReply::Result(result)),
            (None, None) => Err(RemoteError::decode(method, "neither result nor error")),
        }
    }
}

pub(crate) fn parse_chain_time(method: &str, raw: &str) -> Result<DateTime<Utc>, RemoteError> {
    NaiveDateTime::parse_from_str(raw, CHAIN_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| RemoteError::decode(method, format!("bad timestamp {raw:?}: {e}")))
}

/// Operations come either as `["comment", {...}]` or as
/// `{"type": "comment_operation", "value": {...}}` depending on the node.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OpRepr {
    Pair(String, Value),
    Typed {
        #[serde(rename = "type")]
        kind: String,
        value: Value,
    },
}

impl OpRepr {
    fn into_parts(self) -> (String, Value) {
        match self {
            OpRepr::Pair(name, body) => (name, body),
            OpRepr::Typed { kind, value } => {
                let name = kind.strip_suffix("_operation").unwrap_or(&kind).to_string();
                (name, value)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHistoryEntry {
    timestamp: String,
    op: OpRepr,
}

fn decode_operation(method: &str, op: OpRepr) -> Result<Operation, RemoteError> {
    let (name, body) = op.into_parts();
    if name == "comment" {
        serde_json::from_value::<CommentOp>(body)
            .map(Operation::Comment)
            .map_err(|e| RemoteError::decode(method, format!("comment op: {e}")))
    } else {
        Ok(Operation::Other(name))
    }
}

pub(crate) fn decode_history(method: &str, result: Value) -> Result<Vec<HistoryEntry>, RemoteError> {
    let rows: Vec<(u64, RawHistoryEntry)> = serde_json::from_value(result)
        .map_err(|e| RemoteError::decode(method, format!("history rows: {e}")))?;
    let mut entries = rows
        .into_iter()
        .map(|(index, raw)| {
            Ok(HistoryEntry {
                index,
                timestamp: parse_chain_time(method, &raw.timestamp)?,
                op: decode_operation(method, raw.op)?,
            })
        })
        .collect::<Result<Vec<_>, RemoteError>>()?;
    entries.sort_by_key(|e| e.index);
    Ok(entries)
}

#[derive(Debug, Deserialize)]
struct RawContent {
    author: String,
    permlink: String,
    #[serde(default)]
    parent_author: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    created: String,
}

pub(crate) fn decode_content(method: &str, result: Value) -> Result<Content, RemoteError> {
    let raw: RawContent = serde_json::from_value(result)
        .map_err(|e| RemoteError::decode(method, format!("content: {e}")))?;
    // Unknown permlinks come back as an all-empty object.
    if raw.author.is_empty() {
        return Err(RemoteError::decode(method, "content not found"));
    }
    Ok(Content {
        created: parse_chain_time(method, &raw.created)?,
        author: AccountName::new(raw.author),
        permlink: raw.permlink,
        parent_author: raw.parent_author,
        title: raw.title,
        body: raw.body,
    })
}

#[derive(Debug, Deserialize)]
struct RawFollow {
    follower: String,
    following: String,
    #[serde(default)]
    what: Vec<String>,
}

pub(crate) fn decode_following(method: &str, result: Value) -> Result<Vec<FollowRow>, RemoteError> {
    let rows: Vec<RawFollow> = serde_json::from_value(result)
        .map_err(|e| RemoteError::decode(method, format!("follow rows: {e}")))?;
    Ok(rows
        .into_iter()
        .map(|row| FollowRow {
            follower: AccountName::new(row.follower),
            following: AccountName::new(row.following),
            what: row.what,
        })
        .collect())
}

pub(crate) fn decode_accounts(method: &str, result: Value) -> Result<usize, RemoteError> {
    match result {
        Value::Array(accounts) => Ok(accounts.len()),
        other => Err(RemoteError::decode(
            method,
            format!("expected account list, got {other}"),
        )),
    }
}
