//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **RpcClient**: 本番用の JSON-RPC クライアント
//! - **JsonFileStore**: 本番用の DurableStore（JSON ファイル 1 つ）
//! - **InMemoryStore**: 開発・テスト用の DurableStore
//! - **ScriptedRemote**: 開発・テスト用の RemoteApi
//! - **LogNotifier / RecordingNotifier**: Notifier

pub mod file_store;
pub mod memory_store;
pub mod notifier;
pub mod rpc;
pub mod scripted_remote;

pub use self::file_store::JsonFileStore;
pub use self::memory_store::InMemoryStore;
pub use self::notifier::{LogNotifier, RecordingNotifier};
pub use self::rpc::{DEFAULT_RATE_LIMIT_CODE, RpcClient};
pub use self::scripted_remote::{Method, ScriptedRemote};
