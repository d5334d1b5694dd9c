use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::session::{FailedEntry, SessionStore};
use crate::cache::SHARED_SCOPE;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::task::{EngineContext, RunOptions, Task, TaskStats};
use crate::plugins;

/// What one task run came to.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub name: String,
    pub aborted: Option<String>,
    pub stats: TaskStats,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.aborted.is_none()
    }
}

/// Composition root: owns the config, the session, and the engine context,
/// and drives configured tasks through their lifecycle one after another.
pub struct Manager {
    config: Config,
    session: SessionStore,
    ctx: EngineContext,
}

impl Manager {
    /// Build a manager with the built-in plugin set and the resolvers the
    /// config enables.
    pub fn new(config: Config, session: SessionStore, options: RunOptions) -> Result<Self> {
        let (plugin_registry, resolver_registry) = plugins::builtin_registries(&config)?;
        Ok(Self {
            config,
            session,
            ctx: EngineContext {
                plugins: Arc::new(plugin_registry),
                resolvers: Arc::new(resolver_registry),
                options,
            },
        })
    }

    /// Build a manager around an existing context. Used by tests and
    /// embedders that bring their own plugins.
    pub fn with_context(config: Config, session: SessionStore, ctx: EngineContext) -> Self {
        Self {
            config,
            session,
            ctx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Execute configured tasks sequentially (optionally just one), then run
    /// the terminate pass for every task that did not abort, then persist
    /// the session unless in test mode.
    pub async fn run(&self, task_filter: Option<&str>) -> Result<Vec<TaskOutcome>> {
        let selected: Vec<(&String, &crate::config::TaskConfig)> = match task_filter {
            Some(name) => {
                let (key, config) = self
                    .config
                    .tasks
                    .get_key_value(name)
                    .ok_or_else(|| Error::NotFound(format!("Task '{}' is not configured", name)))?;
                vec![(key, config)]
            }
            None => self.config.tasks.iter().collect(),
        };

        if selected.is_empty() {
            warn!("No tasks configured, nothing to do");
            return Ok(Vec::new());
        }

        let mut tasks = Vec::with_capacity(selected.len());
        for (name, task_config) in selected {
            let mut task = Task::new(
                name.clone(),
                task_config.clone(),
                self.session.cache(name),
                self.session.cache(SHARED_SCOPE),
                self.session.failure_sink(),
            );
            task.execute(&self.ctx).await;
            tasks.push(task);
        }

        for task in &mut tasks {
            task.terminate(&self.ctx).await;
        }

        if self.ctx.options.test {
            info!("Test mode: session not persisted");
        } else {
            self.session.save()?;
        }

        Ok(tasks
            .into_iter()
            .map(|task| TaskOutcome {
                name: task.name().to_string(),
                aborted: task.abort_reason().map(String::from),
                stats: task.stats(),
            })
            .collect())
    }

    pub fn failed_entries(&self) -> Vec<FailedEntry> {
        self.session.failed()
    }

    pub fn clear_failed(&self) -> Result<()> {
        self.session.clear_failed();
        self.session.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::error::PluginError;
    use crate::pipeline::task::Task;
    use crate::pipeline::{Event, Plugin, PluginRegistry, ResolverRegistry};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Producer;

    #[async_trait]
    impl Plugin for Producer {
        fn name(&self) -> &'static str {
            "producer"
        }
        fn events(&self) -> &'static [Event] {
            &[Event::Input]
        }
        async fn on_event(&self, _event: Event, task: &mut Task) -> std::result::Result<(), PluginError> {
            task.add_entry(Entry::new("A", "http://x/a"));
            Ok(())
        }
    }

    struct ExplodingInput;

    #[async_trait]
    impl Plugin for ExplodingInput {
        fn name(&self) -> &'static str {
            "exploding_input"
        }
        fn events(&self) -> &'static [Event] {
            &[Event::Input]
        }
        async fn on_event(&self, _event: Event, _task: &mut Task) -> std::result::Result<(), PluginError> {
            Err(PluginError::fatal("input blew up"))
        }
    }

    struct OutputRecorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Plugin for OutputRecorder {
        fn name(&self) -> &'static str {
            "output_recorder"
        }
        fn events(&self) -> &'static [Event] {
            &[Event::Output]
        }
        async fn on_event(&self, _event: Event, task: &mut Task) -> std::result::Result<(), PluginError> {
            self.seen.lock().push(task.name().to_string());
            Ok(())
        }
    }

    fn two_task_config() -> Config {
        toml::from_str(
            r#"
[tasks.broken.exploding_input]
[tasks.broken.output_recorder]
[tasks.healthy.producer]
[tasks.healthy.output_recorder]
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_aborted_task_does_not_affect_sibling() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Producer));
        registry.register(Arc::new(ExplodingInput));
        registry.register(Arc::new(OutputRecorder {
            seen: Arc::clone(&seen),
        }));

        let manager = Manager::with_context(
            two_task_config(),
            SessionStore::in_memory(),
            EngineContext {
                plugins: Arc::new(registry),
                resolvers: Arc::new(ResolverRegistry::new()),
                options: RunOptions::default(),
            },
        );

        let outcomes = manager.run(None).await.unwrap();
        assert_eq!(outcomes.len(), 2);

        let broken = outcomes.iter().find(|o| o.name == "broken").unwrap();
        assert!(!broken.succeeded());
        assert!(broken.aborted.as_ref().unwrap().contains("exploding_input"));

        let healthy = outcomes.iter().find(|o| o.name == "healthy").unwrap();
        assert!(healthy.succeeded());

        // output ran only for the healthy task
        assert_eq!(*seen.lock(), vec!["healthy".to_string()]);
    }

    #[tokio::test]
    async fn test_task_filter_selects_one_task() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Producer));
        registry.register(Arc::new(ExplodingInput));
        registry.register(Arc::new(OutputRecorder {
            seen: Arc::clone(&seen),
        }));

        let manager = Manager::with_context(
            two_task_config(),
            SessionStore::in_memory(),
            EngineContext {
                plugins: Arc::new(registry),
                resolvers: Arc::new(ResolverRegistry::new()),
                options: RunOptions::default(),
            },
        );

        let outcomes = manager.run(Some("healthy")).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].name, "healthy");
    }

    #[tokio::test]
    async fn test_unknown_task_filter_errors() {
        let manager = Manager::with_context(
            Config::default(),
            SessionStore::in_memory(),
            EngineContext {
                plugins: Arc::new(PluginRegistry::new()),
                resolvers: Arc::new(ResolverRegistry::new()),
                options: RunOptions::default(),
            },
        );

        let result = manager.run(Some("nope")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
