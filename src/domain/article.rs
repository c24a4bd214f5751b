use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Author;
use crate::html::strip_html;

/// Average adult reading speed used for estimates.
pub const WORDS_PER_MINUTE: f64 = 200.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Storage-assigned identifier, `0` until the article is persisted.
    pub id: i64,
    /// Owning feed, referenced by identifier.
    pub feed_id: i64,
    pub title: String,
    pub link: Option<String>,
    pub summary: String,
    pub content: String,
    /// Feed-native GUID.
    pub identifier: Option<String>,
    pub published: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub read: bool,
    pub synced: bool,
    pub authors: Vec<Author>,
    /// Cached reading-time estimate in seconds.
    pub estimated_reading_time: Option<f64>,
    pub flags: Vec<String>,
    pub related: BTreeSet<i64>,
}

impl Article {
    pub fn new(feed_id: i64) -> Self {
        Self {
            id: 0,
            feed_id,
            title: String::new(),
            link: None,
            summary: String::new(),
            content: String::new(),
            identifier: None,
            published: Utc::now(),
            updated: None,
            read: false,
            synced: false,
            authors: Vec::new(),
            estimated_reading_time: None,
            flags: Vec::new(),
            related: BTreeSet::new(),
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }

    /// The date used for sorting and display.
    ///
    /// `updated` wins unless it predates `published`.
    pub fn effective_date(&self) -> DateTime<Utc> {
        match self.updated {
            Some(updated) if updated >= self.published => updated,
            _ => self.published,
        }
    }

    /// Text the reading-time estimate is based on: content, else summary.
    pub fn reading_text(&self) -> &str {
        if self.content.trim().is_empty() {
            &self.summary
        } else {
            &self.content
        }
    }

    /// Relate two articles. The relation is symmetric and never reflexive.
    /// Relations are kept by storage id, so unsaved articles cannot be related.
    pub fn add_related(&mut self, other: &mut Article) -> bool {
        if self.id == 0 || other.id == 0 || self.id == other.id {
            return false;
        }
        let inserted = self.related.insert(other.id);
        other.related.insert(self.id);
        inserted
    }

    pub fn remove_related(&mut self, other: &mut Article) -> bool {
        let removed = self.related.remove(&other.id);
        other.related.remove(&self.id);
        removed
    }

    pub fn add_flag(&mut self, flag: &str) -> bool {
        if flag.is_empty() || self.flags.iter().any(|f| f == flag) {
            return false;
        }
        self.flags.push(flag.to_string());
        true
    }

    pub fn remove_flag(&mut self, flag: &str) -> bool {
        let before = self.flags.len();
        self.flags.retain(|f| f != flag);
        before != self.flags.len()
    }
}

impl PartialEq for Article {
    fn eq(&self, other: &Self) -> bool {
        if self.id != 0 && other.id != 0 {
            return self.id == other.id;
        }
        self.title == other.title
            && self.link == other.link
            && self.summary == other.summary
            && self.content == other.content
            && self.identifier == other.identifier
            && self.published == other.published
            && self.updated == other.updated
            && self.read == other.read
            && self.authors == other.authors
            && self.flags == other.flags
    }
}

/// Estimate reading time in seconds for an HTML fragment.
pub fn estimate_reading_time(html: &str) -> f64 {
    let words = strip_html(html).split_whitespace().count();
    let words_per_second = WORDS_PER_MINUTE / 60.0;
    words as f64 / words_per_second
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
    }

    fn persisted(id: i64) -> Article {
        let mut article = Article::new(1);
        article.id = id;
        article
    }

    #[test]
    fn test_reading_time_five_words() {
        let seconds = estimate_reading_time("one two three four five");
        assert!((seconds - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_reading_time_ignores_markup() {
        let seconds = estimate_reading_time("<p>one <b>two</b></p><div>three</div>");
        assert!((seconds - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_reading_time_empty_is_zero() {
        assert_eq!(estimate_reading_time(""), 0.0);
        assert_eq!(estimate_reading_time("   <br/>  "), 0.0);
    }

    #[test]
    fn test_reading_text_falls_back_to_summary() {
        let mut article = Article::new(1);
        article.summary = "short".into();
        assert_eq!(article.reading_text(), "short");
        article.content = "long form".into();
        assert_eq!(article.reading_text(), "long form");
    }

    #[test]
    fn test_effective_date_prefers_later_update() {
        let mut article = Article::new(1);
        article.published = date(2020);
        article.updated = Some(date(2021));
        assert_eq!(article.effective_date(), date(2021));
    }

    #[test]
    fn test_effective_date_ignores_earlier_update() {
        let mut article = Article::new(1);
        article.published = date(2020);
        article.updated = Some(date(2019));
        assert_eq!(article.effective_date(), date(2020));
    }

    #[test]
    fn test_effective_date_without_update() {
        let mut article = Article::new(1);
        article.published = date(2020);
        assert_eq!(article.effective_date(), date(2020));
    }

    #[test]
    fn test_related_is_symmetric() {
        let mut a = persisted(1);
        let mut b = persisted(2);
        assert!(a.add_related(&mut b));
        assert!(a.related.contains(&2));
        assert!(b.related.contains(&1));

        assert!(b.remove_related(&mut a));
        assert!(a.related.is_empty());
        assert!(b.related.is_empty());
    }

    #[test]
    fn test_related_is_not_reflexive() {
        let mut a = persisted(1);
        let mut same = a.clone();
        assert!(!a.add_related(&mut same));
        assert!(a.related.is_empty());
    }

    #[test]
    fn test_unsaved_articles_are_not_related() {
        let mut a = Article::new(1);
        a.link = Some("https://example.com/a".into());
        let mut b = Article::new(1);
        b.link = Some("https://example.com/b".into());
        assert!(!a.add_related(&mut b));

        let mut saved = persisted(4);
        assert!(!saved.add_related(&mut a));
        assert!(a.related.is_empty());
        assert!(b.related.is_empty());
        assert!(saved.related.is_empty());
    }

    #[test]
    fn test_flags_do_not_duplicate() {
        let mut article = Article::new(1);
        assert!(article.add_flag("starred"));
        assert!(!article.add_flag("starred"));
        assert!(article.remove_flag("starred"));
        assert!(article.flags.is_empty());
    }

    #[test]
    fn test_equality_uses_identity_when_persisted() {
        let a = persisted(3);
        let mut b = persisted(3);
        b.title = "changed".into();
        assert_eq!(a, b);
    }
}
