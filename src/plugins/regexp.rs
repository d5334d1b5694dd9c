use async_trait::async_trait;
use regex::RegexBuilder;
use serde::Deserialize;
use tracing::debug;

use crate::error::PluginError;
use crate::pipeline::task::Task;
use crate::pipeline::{Event, Plugin};

/// Filter plugin accepting or rejecting entries by regex match on the
/// title. Patterns are case-insensitive; reject patterns are checked first,
/// so an entry matching both is rejected.
///
/// ```toml
/// [tasks.tv.regexp]
/// accept = ["1080p", "2160p"]
/// reject = ["CAM", "HDTS"]
/// ```
pub struct RegexpFilter;

#[derive(Debug, Default, Deserialize)]
struct RegexpConfig {
    #[serde(default)]
    accept: Vec<String>,
    #[serde(default)]
    reject: Vec<String>,
}

fn compile(patterns: &[String]) -> Result<Vec<(String, regex::Regex)>, PluginError> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map(|re| (p.clone(), re))
                .map_err(|e| PluginError::fatal(format!("invalid pattern '{}': {}", p, e)))
        })
        .collect()
}

#[async_trait]
impl Plugin for RegexpFilter {
    fn name(&self) -> &'static str {
        "regexp"
    }

    fn events(&self) -> &'static [Event] {
        &[Event::Filter]
    }

    async fn on_event(&self, _event: Event, task: &mut Task) -> Result<(), PluginError> {
        let Some(value) = task.plugin_config("regexp").cloned() else {
            return Ok(());
        };
        let config: RegexpConfig = value
            .try_into()
            .map_err(|e| PluginError::fatal(format!("invalid regexp config: {}", e)))?;

        let reject = compile(&config.reject)?;
        let accept = compile(&config.accept)?;

        for te in task.entries_mut() {
            let Some(title) = te.entry.title() else {
                continue;
            };

            if let Some((pattern, _)) = reject.iter().find(|(_, re)| re.is_match(title)) {
                let reason = format!("matched reject pattern '{}'", pattern);
                debug!("regexp: rejecting '{}': {}", title, reason);
                te.reject(reason);
            } else if let Some((pattern, _)) = accept.iter().find(|(_, re)| re.is_match(title)) {
                debug!("regexp: accepting '{}' (pattern '{}')", title, pattern);
                te.accept();
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::session::SessionStore;
    use crate::cache::SHARED_SCOPE;
    use crate::config::TaskConfig;
    use crate::entry::Entry;
    use crate::pipeline::task::{EngineContext, RunOptions};
    use crate::pipeline::{Disposition, PluginRegistry, ResolverRegistry};
    use std::sync::Arc;

    struct FixedInput;

    #[async_trait]
    impl Plugin for FixedInput {
        fn name(&self) -> &'static str {
            "fixed_input"
        }
        fn events(&self) -> &'static [Event] {
            &[Event::Input]
        }
        async fn on_event(&self, _event: Event, task: &mut Task) -> Result<(), PluginError> {
            task.add_entry(Entry::new("Show S01E01 1080p BluRay", "http://x/1"));
            task.add_entry(Entry::new("Show S01E01 CAM 1080p", "http://x/2"));
            task.add_entry(Entry::new("Other Show 480p", "http://x/3"));
            Ok(())
        }
    }

    async fn run_with(config_toml: &str) -> Task {
        let store = SessionStore::in_memory();
        let mut config = TaskConfig::default();
        config
            .plugins
            .insert("fixed_input".to_string(), toml::Value::Boolean(true));
        config
            .plugins
            .insert("regexp".to_string(), toml::from_str(config_toml).unwrap());

        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(FixedInput));
        registry.register(Arc::new(RegexpFilter));

        let mut task = Task::new(
            "t",
            config,
            store.cache("t"),
            store.cache(SHARED_SCOPE),
            store.failure_sink(),
        );
        task.execute(&EngineContext {
            plugins: Arc::new(registry),
            resolvers: Arc::new(ResolverRegistry::new()),
            options: RunOptions::default(),
        })
        .await;
        task
    }

    #[tokio::test]
    async fn test_accept_and_reject_patterns() {
        let task = run_with("accept = [\"1080p\"]\nreject = [\"CAM\"]").await;

        assert!(!task.is_aborted());
        // CAM release rejected even though it also matches accept;
        // 480p release neither matched and was purged as filtered-less pending
        let titles: Vec<_> = task
            .entries()
            .iter()
            .map(|te| te.entry.title().unwrap())
            .collect();
        assert_eq!(titles, vec!["Show S01E01 1080p BluRay", "Other Show 480p"]);
        assert_eq!(task.entries()[0].disposition(), Disposition::Accepted);
        assert_eq!(task.entries()[1].disposition(), Disposition::Pending);
        assert_eq!(task.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_case_insensitive_matching() {
        let task = run_with("reject = [\"cam\"]").await;
        assert_eq!(task.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_invalid_pattern_aborts() {
        let task = run_with("accept = [\"(unclosed\"]").await;
        assert!(task.is_aborted());
        assert!(task.abort_reason().unwrap().contains("regexp"));
    }
}
