//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」です。外部の協調者（永続ストア、
//! リモート API、通知、設定、時刻）へのインターフェースを定義し、
//! 実装の詳細は `impls` に置きます。
//!
//! # 設計原則
//! - Durable Store が唯一の共有状態（プロセス内シングルトンは持たない）
//! - Poller / Viewer は (永続状態, 外部入力) → (新しい永続状態, 副作用) として振る舞う

pub mod clock;
pub mod id_generator;
pub mod notifier;
pub mod remote;
pub mod settings;
pub mod store;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::notifier::Notifier;
pub use self::remote::RemoteApi;
pub use self::settings::SettingsSource;
pub use self::store::{DurableStore, keys, load_json, load_or_default, save_json};
