//! SettingsSource port - 設定の読み込み
//!
//! Poll cycle の開始ごとに読み直されます（読み取り専用）。

use async_trait::async_trait;

use crate::config::Settings;
use crate::domain::ConfigError;

#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn load(&self) -> Result<Settings, ConfigError>;
}
