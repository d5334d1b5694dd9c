use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cache::session::FailureSink;
use crate::cache::ScopedCache;
use crate::config::TaskConfig;
use crate::entry::Entry;
use crate::error::PluginError;
use crate::pipeline::resolve;
use crate::pipeline::{effective_order, Event, Plugin, PluginRegistry, ResolverRegistry, TaskEntry};

/// Run-wide execution switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Execute without persisting the session or writing outputs.
    pub test: bool,
    /// Skip download/output events but still run filters, so stateful
    /// filters learn the entries.
    pub learn: bool,
    /// Keep filtered entries in the list between events instead of purging
    /// them. Used by callers that want to inspect filter decisions.
    pub keep_filtered: bool,
}

/// Everything a task needs from its surroundings: the registries and the
/// run options. Passed explicitly into execution — tasks hold no global
/// state.
pub struct EngineContext {
    pub plugins: Arc<PluginRegistry>,
    pub resolvers: Arc<ResolverRegistry>,
    pub options: RunOptions,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskStats {
    pub produced: usize,
    pub accepted: usize,
    pub filtered: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// One configured pipeline execution: runs registered plugins through the
/// fixed event sequence, tracking entry dispositions and purging discarded
/// entries at the documented checkpoints.
pub struct Task {
    name: String,
    config: TaskConfig,
    entries: Vec<TaskEntry>,
    abort_reason: Option<String>,
    current_event: Option<Event>,
    current_plugin: Option<String>,
    cache: ScopedCache,
    shared_cache: ScopedCache,
    failures: FailureSink,
    options: RunOptions,
    stats: TaskStats,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        config: TaskConfig,
        cache: ScopedCache,
        shared_cache: ScopedCache,
        failures: FailureSink,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            entries: Vec::new(),
            abort_reason: None,
            current_event: None,
            current_plugin: None,
            cache,
            shared_cache,
            failures,
            options: RunOptions::default(),
            stats: TaskStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// The running plugin's per-task configuration, raw. Plugins decode it
    /// themselves.
    pub fn plugin_config(&self, plugin: &str) -> Option<&toml::Value> {
        self.config.plugins.get(plugin)
    }

    /// Cache scoped to this task; the namespace tracks the running plugin.
    pub fn cache(&self) -> &ScopedCache {
        &self.cache
    }

    /// Cache visible to every task, for cross-task bookkeeping.
    pub fn shared_cache(&self) -> &ScopedCache {
        &self.shared_cache
    }

    pub fn entries(&self) -> &[TaskEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [TaskEntry] {
        &mut self.entries
    }

    pub fn add_entry(&mut self, entry: Entry) {
        debug!("Task '{}': new entry {}", self.name, entry.describe());
        self.stats.produced += 1;
        self.entries.push(TaskEntry::new(entry));
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn stats(&self) -> TaskStats {
        self.stats
    }

    /// The event currently being processed, for log context.
    pub fn current_event(&self) -> Option<Event> {
        self.current_event
    }

    /// The plugin currently being invoked, for log context.
    pub fn current_plugin(&self) -> Option<&str> {
        self.current_plugin.as_deref()
    }

    pub fn accepted_count(&self) -> usize {
        self.entries.iter().filter(|te| te.is_accepted()).count()
    }

    /// Halt further event processing for this task. Checked at the fixed
    /// checkpoints (after each plugin callback, before each event) — not
    /// preemptive.
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.abort_reason.is_none() {
            let reason = reason.into();
            warn!("Task '{}' aborting: {}", self.name, reason);
            self.abort_reason = Some(reason);
        }
    }

    /// Run the main event sequence. Resolution is engine-owned rather than
    /// a generic plugin slot; an abort hard-stops the remaining events.
    pub async fn execute(&mut self, ctx: &EngineContext) {
        self.options = ctx.options;
        info!("Executing task '{}'", self.name);

        for event in Event::MAIN_SEQUENCE {
            if self.abort_reason.is_some() {
                break;
            }

            if self.options.learn && matches!(event, Event::Download | Event::Output) {
                debug!("Task '{}': learn mode, skipping {} event", self.name, event);
                continue;
            }

            if event == Event::Resolve {
                self.resolve_entries(&ctx.resolvers).await;
                self.purge_failed();
                continue;
            }

            self.run_event(ctx, event).await;
            if self.abort_reason.is_some() {
                break;
            }

            if !self.options.keep_filtered {
                self.purge_filtered();
            }
            self.purge_failed();
        }

        self.stats.accepted = self.accepted_count();
        match &self.abort_reason {
            Some(reason) => warn!("Task '{}' aborted: {}", self.name, reason),
            None => info!(
                "Task '{}' finished: {} produced, {} accepted, {} rejected, {} filtered, {} failed",
                self.name,
                self.stats.produced,
                self.stats.accepted,
                self.stats.rejected,
                self.stats.filtered,
                self.stats.failed,
            ),
        }
    }

    /// Run the terminate event once. Skipped entirely for aborted tasks.
    pub async fn terminate(&mut self, ctx: &EngineContext) {
        if self.abort_reason.is_some() {
            debug!("Task '{}' aborted, skipping terminate", self.name);
            return;
        }
        self.run_event(ctx, Event::Terminate).await;
    }

    async fn run_event(&mut self, ctx: &EngineContext, event: Event) {
        let plugins = self.plugins_for_event(&ctx.plugins, event);
        if plugins.is_empty() {
            return;
        }
        debug!(
            "Task '{}': {} event with {} plugin(s)",
            self.name,
            event,
            plugins.len()
        );

        for plugin in plugins {
            let plugin_name = plugin.name();
            self.current_event = Some(event);
            self.current_plugin = Some(plugin_name.to_string());
            self.cache.set_namespace(plugin_name);
            self.shared_cache.set_namespace(plugin_name);

            match plugin.on_event(event, self).await {
                Ok(()) => {}
                Err(PluginError::Warning(msg)) => {
                    warn!(
                        "Task '{}': plugin '{}' warned during {}: {}",
                        self.name, plugin_name, event, msg
                    );
                }
                Err(e) => {
                    error!(
                        "Task '{}': plugin '{}' failed during {}: {}",
                        self.name, plugin_name, event, e
                    );
                    self.abort(format!("plugin '{}' failed during {}: {}", plugin_name, event, e));
                }
            }

            if self.abort_reason.is_some() {
                return;
            }
            self.purge_rejected();
        }
    }

    /// Plugins configured for this task at `event`, sorted by effective
    /// order (config override beats plugin default) with registration
    /// sequence breaking ties.
    fn plugins_for_event(&self, registry: &PluginRegistry, event: Event) -> Vec<Arc<dyn Plugin>> {
        let mut selected: Vec<(i64, usize, Arc<dyn Plugin>)> = registry
            .for_event(event)
            .into_iter()
            .filter(|(_, plugin)| self.wants_plugin(plugin.as_ref()))
            .map(|(seq, plugin)| {
                (effective_order(&plugin, &self.config.priorities), seq, plugin)
            })
            .collect();
        selected.sort_by_key(|(order, seq, _)| (*order, *seq));
        selected.into_iter().map(|(_, _, plugin)| plugin).collect()
    }

    fn wants_plugin(&self, plugin: &dyn Plugin) -> bool {
        self.config.plugins.contains_key(plugin.name())
            || (plugin.builtin() && !self.config.disable.iter().any(|d| d == plugin.name()))
    }

    async fn resolve_entries(&mut self, resolvers: &ResolverRegistry) {
        if resolvers.is_empty() || self.entries.is_empty() {
            return;
        }
        self.current_event = Some(Event::Resolve);
        self.current_plugin = None;

        let mut failure_counts = self.shared_cache.clone();
        failure_counts.set_namespace(resolve::FAILURE_NAMESPACE);

        for te in &mut self.entries {
            if te.is_rejected() || te.is_failed() {
                continue;
            }
            match resolve::resolve_entry(resolvers, &mut te.entry, &failure_counts).await {
                Ok(()) => {}
                Err(e) => {
                    warn!(
                        "Task '{}': failed to resolve '{}': {}",
                        self.name,
                        te.entry.describe(),
                        e
                    );
                    te.fail(e.to_string());
                }
            }
        }
    }

    /// Rejected entries leave the list unconditionally — rejection wins over
    /// every other disposition.
    fn purge_rejected(&mut self) {
        let name = &self.name;
        let before = self.entries.len();
        self.entries.retain(|te| {
            if te.is_rejected() {
                debug!(
                    "Task '{}': purged rejected entry {} ({})",
                    name,
                    te.entry.describe(),
                    te.reason().unwrap_or("no reason")
                );
                false
            } else {
                true
            }
        });
        self.stats.rejected += before - self.entries.len();
    }

    fn purge_filtered(&mut self) {
        let name = &self.name;
        let before = self.entries.len();
        self.entries.retain(|te| {
            if te.disposition() == crate::pipeline::Disposition::Filtered {
                debug!(
                    "Task '{}': purged filtered entry {} ({})",
                    name,
                    te.entry.describe(),
                    te.reason().unwrap_or("no reason")
                );
                false
            } else {
                true
            }
        });
        self.stats.filtered += before - self.entries.len();
    }

    /// Failed entries leave the list and land on the process-wide failed
    /// list as they go.
    fn purge_failed(&mut self) {
        let name = &self.name;
        let failures = &self.failures;
        let before = self.entries.len();
        self.entries.retain(|te| {
            if te.is_failed() {
                let reason = te.reason().unwrap_or("unknown failure");
                debug!(
                    "Task '{}': purged failed entry {} ({})",
                    name,
                    te.entry.describe(),
                    reason
                );
                failures.record(
                    te.entry.title().unwrap_or("<untitled>"),
                    te.entry.url().unwrap_or("-"),
                    reason,
                );
                false
            } else {
                true
            }
        });
        self.stats.failed += before - self.entries.len();
    }
}
