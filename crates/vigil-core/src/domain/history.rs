//! Decoded remote data: account history entries, content, follows.
//!
//! These are the typed shapes the API boundary decodes into; nothing past the
//! boundary reads raw JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountName;

/// Bodies of edits are diff-match-patch patches, not full text.
const PATCH_MARKER: &str = "@@ -";

/// One entry of an account's operation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Position in the account's history; strictly increasing.
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub op: Operation,
}

/// History operations this crate cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Comment(CommentOp),
    /// Any other operation, by name (votes, transfers, ...).
    Other(String),
}

impl Operation {
    pub fn name(&self) -> &str {
        match self {
            Operation::Comment(_) => "comment",
            Operation::Other(name) => name,
        }
    }
}

/// A `comment` operation: root posts and replies share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentOp {
    #[serde(default)]
    pub parent_author: String,
    #[serde(default)]
    pub parent_permlink: String,
    pub author: AccountName,
    pub permlink: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl CommentOp {
    /// Root posts have an empty parent author.
    pub fn has_parent(&self) -> bool {
        !self.parent_author.is_empty()
    }

    pub fn is_edit(&self) -> bool {
        self.body.starts_with(PATCH_MARKER)
    }
}

/// Current state of a content item, from "get content".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub author: AccountName,
    pub permlink: String,
    pub parent_author: String,
    pub title: String,
    pub body: String,
    pub created: DateTime<Utc>,
}

/// One row of a follow list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRow {
    pub follower: AccountName,
    pub following: AccountName,
    /// Follow kinds, e.g. `["blog"]`; `["ignore"]` is a mute.
    pub what: Vec<String>,
}

impl FollowRow {
    pub fn is_follow(&self) -> bool {
        self.what.iter().any(|w| w == "blog")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(parent_author: &str, body: &str) -> CommentOp {
        CommentOp {
            parent_author: parent_author.into(),
            parent_permlink: String::new(),
            author: AccountName::new("alice"),
            permlink: "p".into(),
            title: String::new(),
            body: body.into(),
        }
    }

    #[test]
    fn edit_detection() {
        assert!(op("", "@@ -1,4 +1,5 @@\n-old\n+new").is_edit());
        assert!(!op("", "a fresh post").is_edit());
        assert!(!op("", "@@ not a patch").is_edit());
    }

    #[test]
    fn parent_detection() {
        assert!(!op("", "x").has_parent());
        assert!(op("bob", "x").has_parent());
    }

    #[test]
    fn mute_rows_are_not_follows() {
        let row = FollowRow {
            follower: AccountName::new("alice"),
            following: AccountName::new("spam"),
            what: vec!["ignore".into()],
        };
        assert!(!row.is_follow());
    }
}
