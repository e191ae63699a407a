use serde::{Deserialize, Serialize};
use std::fmt;

/// An account name on the remote chain (observer or tracked entity).
///
/// Normalized on construction: surrounding whitespace and a leading `@` are
/// stripped and the name is lowercased, so `"@Alice "` and `"alice"` compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AccountName(String);

impl AccountName {
    pub fn new(s: impl AsRef<str>) -> Self {
        let trimmed = s.as_ref().trim();
        let bare = trimmed.strip_prefix('@').unwrap_or(trimmed);
        Self(bare.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Chain account names are 3..=16 chars of `[a-z0-9.-]` starting with a letter.
    pub fn is_valid(&self) -> bool {
        let len = self.0.len();
        (3..=16).contains(&len)
            && self.0.starts_with(|c: char| c.is_ascii_lowercase())
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    }
}

impl From<String> for AccountName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for AccountName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<AccountName> for String {
    fn from(name: AccountName) -> Self {
        name.0
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
