use crate::error::{Error, Result};
use crate::feed::{ParsedFeed, ParsedItem};
use feed_rs::parser as feed_parser;
use std::io::BufRead;

pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_feed<R: BufRead>(&self, reader: R) -> Result<ParsedFeed> {
        let feed = feed_parser::parse(reader)
            .map_err(|e| Error::FeedParse(format!("Failed to parse feed: {}", e)))?;

        let title = feed
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled Feed".to_string());
        let description = feed.description.map(|d| d.content);
        let link = feed.links.first().map(|l| l.href.clone());
        let updated = feed.updated.or(feed.published);

        let items = feed
            .entries
            .into_iter()
            .map(|item| {
                let title = item
                    .title
                    .map(|t| t.content)
                    .unwrap_or_else(|| "Untitled".to_string());
                let link = item.links.first().map(|l| l.href.clone());
                let description = item.summary.map(|s| s.content);
                let author = item.authors.first().map(|a| a.name.clone());
                let published = item.published.or(item.updated);
                let guid = if item.id.is_empty() { None } else { Some(item.id) };
                let categories = item.categories.into_iter().map(|c| c.term).collect();

                ParsedItem {
                    title,
                    link,
                    description,
                    author,
                    published,
                    guid,
                    categories,
                }
            })
            .collect();

        Ok(ParsedFeed {
            title,
            description,
            link,
            updated,
            items,
        })
    }

    pub fn validate_feed_url(&self, url: &str) -> Result<()> {
        let parsed_url = url::Url::parse(url)
            .map_err(|e| Error::InvalidUrl(format!("Invalid URL: {}", e)))?;

        match parsed_url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(Error::InvalidUrl(format!("Unsupported scheme: {}", scheme))),
        }
    }
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}
