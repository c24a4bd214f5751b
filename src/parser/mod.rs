//! Feed parser port and its `feed-rs` implementation.
//!
//! The parser turns raw bytes into a canonical [`ParsedFeed`]. It does no
//! storage work: reconciliation against stored articles happens in
//! [`crate::update::FeedUpdater`].

use chrono::{DateTime, Utc};
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::ParseError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: String,
    pub summary: String,
    pub image_url: Option<String>,
    /// Site link advertised by the feed, used to resolve relative article links.
    pub link: Option<String>,
    pub articles: Vec<ParsedArticle>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArticle {
    pub title: String,
    pub url: Option<String>,
    pub summary: String,
    pub content: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub guid: Option<String>,
    pub authors: Vec<ParsedAuthor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthor {
    pub name: String,
    pub email: Option<String>,
}

pub trait FeedParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<ParsedFeed, ParseError>;
}

/// Parses RSS 0.9x/1.0/2.0, Atom and JSON Feed through `feed-rs`.
#[derive(Clone, Default)]
pub struct FeedRsParser;

impl FeedRsParser {
    pub fn new() -> Self {
        Self
    }
}

impl FeedParser for FeedRsParser {
    fn parse(&self, bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
        let feed = parser::parse(bytes).map_err(|e| ParseError::Unknown(e.to_string()))?;

        let link = feed
            .links
            .iter()
            .find(|l| l.rel.as_deref() != Some("self"))
            .or_else(|| feed.links.first())
            .map(|l| l.href.clone());

        let image_url = feed
            .logo
            .as_ref()
            .map(|i| i.uri.clone())
            .or_else(|| feed.icon.as_ref().map(|i| i.uri.clone()));

        let articles = feed
            .entries
            .into_iter()
            .map(|entry| {
                let url = entry
                    .links
                    .iter()
                    .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
                    .or_else(|| entry.links.first())
                    .map(|l| l.href.clone());
                let guid = if entry.id.is_empty() {
                    None
                } else {
                    Some(entry.id.clone())
                };

                ParsedArticle {
                    title: entry
                        .title
                        .map(|t| decode_html_entities(&t.content).to_string())
                        .unwrap_or_default(),
                    url,
                    summary: entry
                        .summary
                        .map(|s| decode_html_entities(&s.content).to_string())
                        .unwrap_or_default(),
                    content: entry
                        .content
                        .and_then(|c| c.body)
                        .map(|b| decode_html_entities(&b).to_string())
                        .unwrap_or_default(),
                    published: entry.published.map(|dt| dt.with_timezone(&Utc)),
                    updated: entry.updated.map(|dt| dt.with_timezone(&Utc)),
                    guid,
                    authors: entry
                        .authors
                        .into_iter()
                        .filter(|a| !a.name.trim().is_empty())
                        .map(|a| ParsedAuthor {
                            name: a.name.trim().to_string(),
                            email: a.email.map(|e| {
                                if e.starts_with("mailto:") {
                                    e
                                } else {
                                    format!("mailto:{}", e)
                                }
                            }),
                        })
                        .collect(),
                }
            })
            .collect();

        Ok(ParsedFeed {
            title: feed
                .title
                .map(|t| decode_html_entities(&t.content).to_string())
                .unwrap_or_default(),
            summary: feed
                .description
                .map(|d| decode_html_entities(&d.content).to_string())
                .unwrap_or_default(),
            image_url,
            link,
            articles,
        })
    }
}
