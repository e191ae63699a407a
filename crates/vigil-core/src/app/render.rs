//! Feed rendering for the viewer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{AccountName, ClassifiedItem, ItemKind};

const EXCERPT_CHARS: usize = 140;

/// What the viewer shows: one section per entity, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedView {
    pub observer: AccountName,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<FeedSection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSection {
    pub entity: AccountName,
    pub activity_time: DateTime<Utc>,
    pub items: Vec<FeedItem>,
    /// The scan stopped on an error; the entity stays pending.
    pub incomplete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub kind: ItemKind,
    pub author: AccountName,
    pub permlink: String,
    pub title: String,
    pub excerpt: String,
    pub timestamp: DateTime<Utc>,
    pub link: String,
}

impl FeedItem {
    pub fn from_item(item: &ClassifiedItem, display_endpoint: &str) -> Self {
        let title = if item.title.is_empty() && !item.parent_author.is_empty() {
            format!("re: @{}", item.parent_author)
        } else {
            item.title.clone()
        };
        Self {
            kind: item.kind,
            author: item.author.clone(),
            permlink: item.permlink.clone(),
            title,
            excerpt: excerpt(&item.body, EXCERPT_CHARS),
            timestamp: item.timestamp,
            link: link(display_endpoint, &item.author, &item.permlink),
        }
    }
}

impl FeedView {
    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }
}

pub fn link(display_endpoint: &str, author: &AccountName, permlink: &str) -> String {
    format!("{}/@{}/{}", display_endpoint.trim_end_matches('/'), author, permlink)
}

/// First `max_chars` characters of `body` with whitespace collapsed.
pub fn excerpt(body: &str, max_chars: usize) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &collapsed[..cut]),
        None => collapsed,
    }
}

impl fmt::Display for FeedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sections.is_empty() {
            return writeln!(f, "No new activity for @{}.", self.observer);
        }
        for section in &self.sections {
            write!(f, "@{} ({})", section.entity, section.activity_time.format("%Y-%m-%d %H:%M"))?;
            if section.incomplete {
                write!(f, " [incomplete]")?;
            }
            writeln!(f)?;
            for item in &section.items {
                writeln!(
                    f,
                    "  [{}] {} by @{}",
                    item.kind.as_str(),
                    if item.title.is_empty() { &item.permlink } else { &item.title },
                    item.author
                )?;
                if !item.excerpt.is_empty() {
                    writeln!(f, "      {}", item.excerpt)?;
                }
                writeln!(f, "      {}", item.link)?;
            }
        }
        Ok(())
    }
}
