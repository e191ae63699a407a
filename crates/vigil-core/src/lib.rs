//! vigil-core
//!
//! Follow-list activity poller and feed viewer sharing one durable store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, account, lock, activity, checkpoint, history, item, errors）
//! - **ports**: 抽象化レイヤー（DurableStore, RemoteApi, Notifier, SettingsSource, Clock, IdGenerator）
//! - **impls**: 実装（RpcClient, JsonFileStore, InMemoryStore, ScriptedRemote, notifiers）
//! - **backoff / lock / scanner / dedup / ledger / checkpoint / follows**: 部品
//! - **config**: Settings と Tuning
//! - **app**: PollOrchestrator, ViewerAggregator, PollLoop, status

pub mod app;
pub mod backoff;
pub mod checkpoint;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod follows;
pub mod impls;
pub mod ledger;
pub mod lock;
pub mod ports;
pub mod scanner;

pub use backoff::BackoffPolicy;
pub use config::{ConfigFile, Settings, Tuning};
pub use domain::{Result, VigilError};
