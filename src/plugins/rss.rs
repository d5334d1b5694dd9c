use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::PluginError;
use crate::feed::fetcher::FeedFetcher;
use crate::pipeline::task::Task;
use crate::pipeline::{Event, Plugin};

/// Input plugin producing entries from an RSS/Atom feed.
///
/// Configured as a bare url or a table:
///
/// ```toml
/// [tasks.tv]
/// rss = "https://example.com/feed.xml"
/// # or
/// [tasks.tv.rss]
/// url = "https://example.com/feed.xml"
/// max_entries = 50
/// ```
pub struct RssInput {
    fetcher: FeedFetcher,
    default_max_entries: usize,
}

#[derive(Debug, Deserialize)]
struct RssConfig {
    url: String,
    #[serde(default)]
    max_entries: Option<usize>,
}

impl RssInput {
    pub fn new(settings: &Settings) -> Self {
        Self {
            fetcher: FeedFetcher::from_settings(settings),
            default_max_entries: settings.max_entries,
        }
    }

    fn parse_config(&self, value: toml::Value) -> Result<RssConfig, PluginError> {
        match value {
            toml::Value::String(url) => Ok(RssConfig {
                url,
                max_entries: None,
            }),
            other => other
                .try_into()
                .map_err(|e| PluginError::fatal(format!("invalid rss config: {}", e))),
        }
    }
}

#[async_trait]
impl Plugin for RssInput {
    fn name(&self) -> &'static str {
        "rss"
    }

    fn events(&self) -> &'static [Event] {
        &[Event::Input]
    }

    async fn on_event(&self, _event: Event, task: &mut Task) -> Result<(), PluginError> {
        let Some(value) = task.plugin_config("rss").cloned() else {
            return Ok(());
        };
        let config = self.parse_config(value)?;

        // A feed being down is recoverable: warn and let the task go on
        // with whatever other inputs produced.
        let feed = self
            .fetcher
            .fetch_feed(&config.url)
            .await
            .map_err(|e| PluginError::warning(format!("failed to fetch {}: {}", config.url, e)))?;

        let limit = config.max_entries.unwrap_or(self.default_max_entries);
        let feed_name = task.name().to_string();
        let total = feed.items.len();
        let mut added = 0usize;
        let mut skipped = 0usize;

        for item in feed.items.into_iter().take(limit) {
            let entry = item.into_entry(&feed_name);
            if entry.is_valid() {
                task.add_entry(entry);
                added += 1;
            } else {
                warn!("rss: skipping invalid item from {}: {}", config.url, entry.describe());
                skipped += 1;
            }
        }

        info!(
            "rss: {} entries from '{}' ({} in feed, {} skipped)",
            added, feed.title, total, skipped
        );
        Ok(())
    }
}
