//! Classified content items produced by a scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountName;
use super::history::{CommentOp, Content, HistoryEntry};

/// How a comment-shaped operation relates to the tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A root post (no parent).
    Post,
    /// The entity replied to someone else.
    Comment,
    /// Someone else replied to the entity.
    Reply,
}

impl ItemKind {
    /// Classify `op` as seen in `entity`'s history.
    pub fn classify(entity: &AccountName, op: &CommentOp) -> Self {
        if !op.has_parent() {
            ItemKind::Post
        } else if op.author == *entity {
            ItemKind::Comment
        } else {
            ItemKind::Reply
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Post => "post",
            ItemKind::Comment => "comment",
            ItemKind::Reply => "reply",
        }
    }
}

/// A first-seen content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedItem {
    pub kind: ItemKind,
    pub author: AccountName,
    pub permlink: String,
    pub parent_author: String,
    pub title: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    /// History index the item was found at.
    pub index: u64,
}

impl ClassifiedItem {
    pub fn from_history(kind: ItemKind, op: &CommentOp, entry: &HistoryEntry) -> Self {
        Self {
            kind,
            author: op.author.clone(),
            permlink: op.permlink.clone(),
            parent_author: op.parent_author.clone(),
            title: op.title.clone(),
            body: op.body.clone(),
            timestamp: entry.timestamp,
            index: entry.index,
        }
    }

    /// Replace the history snapshot with the item's current content.
    /// The history timestamp is kept: it is what the scan ordered on.
    pub fn enrich(&mut self, content: Content) {
        if !content.title.is_empty() {
            self.title = content.title;
        }
        if !content.body.is_empty() {
            self.body = content.body;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "alice", ItemKind::Post)]
    #[case("bob", "alice", ItemKind::Comment)]
    #[case("alice", "bob", ItemKind::Reply)]
    #[case("carol", "bob", ItemKind::Reply)]
    fn classification(#[case] parent: &str, #[case] author: &str, #[case] expected: ItemKind) {
        let op = CommentOp {
            parent_author: parent.into(),
            parent_permlink: String::new(),
            author: AccountName::new(author),
            permlink: "x".into(),
            title: String::new(),
            body: "hi".into(),
        };
        assert_eq!(ItemKind::classify(&AccountName::new("alice"), &op), expected);
    }
}
