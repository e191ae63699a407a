//! Notifier port - 新着の通知
//!
//! Fire-and-forget. 実装は新しい通知を出す前に、保留中の通知を必ず消すこと。

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}
