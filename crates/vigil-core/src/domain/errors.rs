//! Error types.
//!
//! 分類（運用上の扱い）:
//! - Transport / RateLimited: Backoff で再試行する
//! - Rpc / Decode: 再試行しない。対象の entity / page をスキップしてログに残す
//! - Store: ローカル状態の読み書き失敗。壊れた値は既定値で修復する
//!
//! Lock contention is not an error anywhere in this crate: acquisition
//! returns `false` and the caller defers.

use thiserror::Error;

use super::account::AccountName;

/// Errors surfaced by the remote API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited (code {code}): {message}")]
    RateLimited { code: i64, message: String },

    #[error("rpc error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response from {method}: {reason}")]
    Decode { method: String, reason: String },
}

impl RemoteError {
    pub fn decode(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that can be retried with backoff.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for RemoteError {
    fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transport(_) | RemoteError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::decode("response body", err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

/// Durable Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("stored value under {key:?} has an unexpected shape: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level error of the library surface.
#[derive(Debug, Error)]
pub enum VigilError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("observer account {0} does not exist")]
    ObserverNotFound(AccountName),
}

pub type Result<T, E = VigilError> = std::result::Result<T, E>;
