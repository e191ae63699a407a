//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppContext**: ports のワイヤリング
//! - **PollOrchestrator**: バックグラウンド poll の状態機械
//! - **PollLoop**: poll cycle を定期実行するタスク
//! - **ViewerAggregator**: フィードを開く（poller をプリエンプト）
//! - **StatusSnapshot**: 永続状態の確認

pub mod context;
pub mod poll_loop;
pub mod poller;
pub mod render;
pub mod status;
pub mod viewer;

// 主要な型を再エクスポート
pub use self::context::AppContext;
pub use self::poll_loop::PollLoop;
pub use self::poller::{CycleOutcome, CycleReport, PollOrchestrator, PollState};
pub use self::render::{FeedItem, FeedSection, FeedView};
pub use self::status::StatusSnapshot;
pub use self::viewer::{ViewOutcome, ViewerAggregator};
