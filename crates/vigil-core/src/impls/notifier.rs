//! Notifier 実装
//!
//! - `LogNotifier`: tracing に出すだけ（デスクトップ通知の代わり）
//! - `RecordingNotifier`: テスト用。送られたメッセージを記録する

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::info;

use crate::ports::Notifier;

/// Keeps one pending notification and logs each new one.
#[derive(Debug, Default)]
pub struct LogNotifier {
    pending: Mutex<Option<String>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            info!(%previous, "cleared pending notification");
        }
        info!(%message, "notification");
        *pending = Some(message.to_string());
    }
}

/// Records every notification in order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
