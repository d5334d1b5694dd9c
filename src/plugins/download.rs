use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::PluginError;
use crate::pipeline::task::Task;
use crate::pipeline::{Event, Plugin};

/// Output plugin downloading accepted entries' urls into a directory.
///
/// ```toml
/// [tasks.tv.download]
/// path = "/data/downloads"
/// overwrite = false
/// ```
///
/// Files are written through a temporary file and renamed into place, so a
/// crash mid-download never leaves a truncated file behind. Download errors
/// fail the affected entry only. In test mode nothing is written.
pub struct DownloadOutput {
    client: Client,
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct DownloadConfig {
    path: String,
    #[serde(default)]
    overwrite: bool,
}

impl DownloadOutput {
    pub fn new(settings: &Settings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout))
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            user_agent: settings.user_agent.clone(),
        }
    }

    async fn download_to(
        &self,
        url: &str,
        target: &Path,
        dir: &Path,
    ) -> Result<u64, String> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP {} for {}", response.status().as_u16(), url));
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| format!("failed to read body: {}", e))?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| format!("failed to create temp file: {}", e))?;
        temp.write_all(&content)
            .map_err(|e| format!("failed to write: {}", e))?;
        temp.persist(target)
            .map_err(|e| format!("failed to move into place: {}", e))?;

        Ok(content.len() as u64)
    }
}

/// Replace characters that are unsafe in filenames, truncating long titles.
fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    if cleaned.chars().count() > 100 {
        let truncated: String = cleaned.chars().take(97).collect();
        format!("{}...", truncated)
    } else {
        cleaned
    }
}

/// A short extension from the url's path, when it has one.
fn url_extension(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.last()?.to_string();
    let (_, ext) = last.rsplit_once('.')?;
    if !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext.to_string())
    } else {
        None
    }
}

fn target_filename(title: &str, url: &str) -> String {
    let base = sanitize_filename(title);
    match url_extension(url) {
        Some(ext) => format!("{}.{}", base, ext),
        None => base,
    }
}

#[async_trait]
impl Plugin for DownloadOutput {
    fn name(&self) -> &'static str {
        "download"
    }

    fn events(&self) -> &'static [Event] {
        &[Event::Output]
    }

    async fn on_event(&self, _event: Event, task: &mut Task) -> Result<(), PluginError> {
        let Some(value) = task.plugin_config("download").cloned() else {
            return Ok(());
        };
        let config: DownloadConfig = value
            .try_into()
            .map_err(|e| PluginError::fatal(format!("invalid download config: {}", e)))?;

        let dir = PathBuf::from(&config.path);
        let test_mode = task.options().test;
        if !test_mode {
            fs::create_dir_all(&dir).map_err(|e| {
                PluginError::fatal(format!(
                    "cannot create download directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let pending: Vec<(usize, String, String)> = task
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, te)| te.is_accepted())
            .filter_map(|(i, te)| {
                let title = te.entry.title()?.to_string();
                let url = te.entry.url()?.to_string();
                Some((i, title, url))
            })
            .collect();

        for (index, title, url) in pending {
            let target = dir.join(target_filename(&title, &url));

            if test_mode {
                info!("download: would fetch {} -> {}", url, target.display());
                continue;
            }

            if target.exists() && !config.overwrite {
                debug!("download: {} already exists, skipping", target.display());
                continue;
            }

            match self.download_to(&url, &target, &dir).await {
                Ok(bytes) => {
                    info!("download: {} ({} bytes) -> {}", url, bytes, target.display());
                }
                Err(reason) => {
                    let reason = format!("download of {} failed: {}", url, reason);
                    task.entries_mut()[index].fail(reason);
                }
            }
        }

        Ok(())
    }
}
