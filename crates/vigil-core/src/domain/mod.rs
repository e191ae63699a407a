//! Domain model (ids, accounts, lock records, ledger, checkpoints, history).

pub mod account;
pub mod activity;
pub mod checkpoint;
pub mod errors;
pub mod history;
pub mod ids;
pub mod item;
pub mod lock;

pub use account::AccountName;
pub use activity::{ActivityEntry, DisplayMarks, Ledger};
pub use checkpoint::ScanCheckpoint;
pub use errors::{ConfigError, RemoteError, Result, Retryable, StoreError, VigilError};
pub use history::{CommentOp, Content, FollowRow, HistoryEntry, Operation};
pub use ids::{CycleId, InstanceId};
pub use item::{ClassifiedItem, ItemKind};
pub use lock::{Grant, Holder, HolderKind, LockRecord, Resource};
