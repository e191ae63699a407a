//! Configuration.
//!
//! `Settings` are the user-facing values and are re-read at the start of each
//! poll cycle. `Tuning` holds the operational constants and is read once at
//! startup. Both live in one TOML file:
//!
//! ```toml
//! observer = "alice"
//! api_endpoint = "https://api.steemit.com"
//! display_endpoint = "https://steemit.com"
//! poll_interval_secs = 420
//!
//! [tuning]
//! page_size = 100
//!
//! [tuning.lock]
//! stale_after_secs = 120
//!
//! [tuning.backoff]
//! max_attempts = 5
//! ```
//!
//! `VIGIL_OBSERVER` and `VIGIL_API_ENDPOINT` override the file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backoff::BackoffPolicy;
use crate::domain::{AccountName, ConfigError};
use crate::ports::SettingsSource;

pub const ENV_OBSERVER: &str = "VIGIL_OBSERVER";
pub const ENV_API_ENDPOINT: &str = "VIGIL_API_ENDPOINT";

fn default_api_endpoint() -> String {
    "https://api.steemit.com".to_string()
}

fn default_display_endpoint() -> String {
    "https://steemit.com".to_string()
}

fn default_poll_interval_secs() -> u64 {
    7 * 60
}

fn unset_observer() -> AccountName {
    AccountName::new("")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Account whose follow list is watched.
    #[serde(default = "unset_observer")]
    pub observer: AccountName,
    /// JSON-RPC endpoint. Bound when the process starts.
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    /// Web front-end used to build item links.
    #[serde(default = "default_display_endpoint")]
    pub display_endpoint: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            observer: unset_observer(),
            api_endpoint: default_api_endpoint(),
            display_endpoint: default_display_endpoint(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Settings {
    /// Settings for `observer` with every other field at its default.
    pub fn for_observer(observer: impl Into<AccountName>) -> Self {
        Self {
            observer: observer.into(),
            ..Self::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.observer.as_str().is_empty() {
            return Err(ConfigError::Invalid("observer is not set".into()));
        }
        if !self.observer.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "observer {:?} is not a valid account name",
                self.observer.as_str()
            )));
        }
        for (name, url) in [
            ("api_endpoint", &self.api_endpoint),
            ("display_endpoint", &self.display_endpoint),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(observer) = lookup(ENV_OBSERVER)
            && !observer.trim().is_empty()
        {
            self.observer = AccountName::new(observer);
        }
        if let Some(endpoint) = lookup(ENV_API_ENDPOINT)
            && !endpoint.trim().is_empty()
        {
            self.api_endpoint = endpoint.trim().to_string();
        }
    }
}

fn default_page_size() -> u32 {
    100
}
fn default_checkpoint_every() -> usize {
    10
}
fn default_max_pages_per_entity() -> u32 {
    20
}
fn default_lookback_hours() -> u32 {
    24
}
fn default_rate_limit_code() -> i64 {
    crate::impls::DEFAULT_RATE_LIMIT_CODE
}
fn default_follow_page() -> u32 {
    crate::follows::DEFAULT_FOLLOW_PAGE
}

/// Operational constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuning {
    /// History entries per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Entities between lock refreshes and checkpoint writes.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    /// Pages a poll may read for one entity before suspending the cycle.
    #[serde(default = "default_max_pages_per_entity")]
    pub max_pages_per_entity: u32,
    /// How far back an entity with no display history is looked at.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    #[serde(default = "default_rate_limit_code")]
    pub rate_limit_code: i64,
    #[serde(default = "default_follow_page")]
    pub follow_page: u32,
    #[serde(default)]
    pub lock: LockTuning,
    #[serde(default)]
    pub backoff: BackoffTuning,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            checkpoint_every: default_checkpoint_every(),
            max_pages_per_entity: default_max_pages_per_entity(),
            lookback_hours: default_lookback_hours(),
            rate_limit_code: default_rate_limit_code(),
            follow_page: default_follow_page(),
            lock: LockTuning::default(),
            backoff: BackoffTuning::default(),
        }
    }
}

impl Tuning {
    pub fn lookback(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.lookback_hours))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("tuning.page_size must be positive".into()));
        }
        if self.checkpoint_every == 0 {
            return Err(ConfigError::Invalid(
                "tuning.checkpoint_every must be positive".into(),
            ));
        }
        if self.max_pages_per_entity == 0 {
            return Err(ConfigError::Invalid(
                "tuning.max_pages_per_entity must be positive".into(),
            ));
        }
        if self.backoff.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "tuning.backoff.max_attempts must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn default_stale_after_secs() -> u64 {
    120
}
fn default_retry_interval_secs() -> u64 {
    15
}
fn default_viewer_max_wait_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockTuning {
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    /// The poller skips a cycle rather than wait.
    #[serde(default)]
    pub poller_max_wait_secs: u64,
    #[serde(default = "default_viewer_max_wait_secs")]
    pub viewer_max_wait_secs: u64,
}

impl Default for LockTuning {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            retry_interval_secs: default_retry_interval_secs(),
            poller_max_wait_secs: 0,
            viewer_max_wait_secs: default_viewer_max_wait_secs(),
        }
    }
}

impl LockTuning {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn poller_max_wait(&self) -> Duration {
        Duration::from_secs(self.poller_max_wait_secs)
    }

    pub fn viewer_max_wait(&self) -> Duration {
        Duration::from_secs(self.viewer_max_wait_secs)
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffTuning {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffTuning {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl From<&BackoffTuning> for BackoffPolicy {
    fn from(tuning: &BackoffTuning) -> Self {
        BackoffPolicy {
            max_attempts: tuning.max_attempts,
            base_delay: Duration::from_millis(tuning.base_delay_ms),
            max_delay: Duration::from_millis(tuning.max_delay_ms),
        }
    }
}

/// The whole config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(flatten)]
    pub settings: Settings,
    #[serde(default)]
    pub tuning: Tuning,
}

impl ConfigFile {
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Read `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::parse(path, &content),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

/// Settings read from a TOML file on every `load`, with environment overrides.
#[derive(Debug, Clone)]
pub struct TomlSettingsFile {
    path: PathBuf,
}

impl TomlSettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsSource for TomlSettingsFile {
    async fn load(&self) -> Result<Settings, ConfigError> {
        let mut settings = ConfigFile::load(&self.path).await?.settings;
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }
}

/// Fixed settings.
#[derive(Debug, Clone)]
pub struct StaticSettings(pub Settings);

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn load(&self) -> Result<Settings, ConfigError> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}
