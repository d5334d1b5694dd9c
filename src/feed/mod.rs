pub mod fetcher;
pub mod parser;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::entry::Entry;

#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone)]
pub struct ParsedItem {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub guid: Option<String>,
    pub categories: Vec<String>,
}

impl ParsedItem {
    /// Convert into a pipeline entry. The id is the feed-supplied guid when
    /// present, otherwise a digest of the link scoped to the feed name.
    pub fn into_entry(self, feed_name: &str) -> Entry {
        let ParsedItem {
            title,
            link,
            description,
            author,
            published,
            guid,
            categories,
        } = self;

        let mut entry = Entry::with_title(title);
        if let Some(link) = link {
            entry.set_url(link);
        }

        let id = guid.unwrap_or_else(|| {
            let digest = blake3::hash(entry.url().unwrap_or_default().as_bytes());
            format!("{}:{}", feed_name, digest.to_hex())
        });
        entry.set("id", json!(id));
        entry.set("feed", json!(feed_name));

        if let Some(description) = description {
            entry.set("description", json!(description));
        }
        if let Some(author) = author {
            entry.set("author", json!(author));
        }
        if let Some(published) = published {
            entry.set("published", json!(published.to_rfc3339()));
        }
        if !categories.is_empty() {
            entry.set("categories", json!(categories));
        }

        entry
    }
}
