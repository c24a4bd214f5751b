use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    /// Storage-assigned identifier, `0` until the feed is persisted.
    pub id: i64,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub image: Option<Vec<u8>>,
    pub unread_count: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Feed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: 0,
            url: url.into(),
            title: String::new(),
            summary: String::new(),
            tags: Vec::new(),
            image: None,
            unread_count: 0,
            last_updated: None,
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }

    /// Tags behave as an ordered set: insertion order is kept, duplicates are dropped.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        before != self.tags.len()
    }
}

impl PartialEq for Feed {
    fn eq(&self, other: &Self) -> bool {
        if self.id != 0 && other.id != 0 {
            return self.id == other.id;
        }
        self.url == other.url
            && self.title == other.title
            && self.summary == other.summary
            && self.tags == other.tags
            && self.image == other.image
    }
}
