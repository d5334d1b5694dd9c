pub mod resolve;
pub mod task;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::PluginError;
use crate::pipeline::task::Task;

/// A named phase in the fixed execution order. Tasks run the main sequence
/// start-to-exit; `Terminate` runs once per task after every task in the run
/// has finished its main sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Event {
    Start,
    Input,
    Filter,
    Resolve,
    Download,
    Modify,
    Output,
    Exit,
    Terminate,
}

impl Event {
    pub const MAIN_SEQUENCE: [Event; 8] = [
        Event::Start,
        Event::Input,
        Event::Filter,
        Event::Resolve,
        Event::Download,
        Event::Modify,
        Event::Output,
        Event::Exit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Input => "input",
            Event::Filter => "filter",
            Event::Resolve => "resolve",
            Event::Download => "download",
            Event::Modify => "modify",
            Event::Output => "output",
            Event::Exit => "exit",
            Event::Terminate => "terminate",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an entry currently stands in its task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Pending,
    Accepted,
    Filtered,
    Rejected,
    Failed,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Disposition::Pending => "pending",
            Disposition::Accepted => "accepted",
            Disposition::Filtered => "filtered",
            Disposition::Rejected => "rejected",
            Disposition::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An entry plus its disposition within one task execution.
///
/// Transitions encode the precedence rules the engine relies on: rejection
/// wins over acceptance, acceptance overrides an earlier filter, and a
/// filter never sticks to an already-accepted entry. Every operation is
/// idempotent.
#[derive(Debug, Clone)]
pub struct TaskEntry {
    pub entry: Entry,
    disposition: Disposition,
    reason: Option<String>,
}

impl TaskEntry {
    pub fn new(entry: Entry) -> Self {
        Self {
            entry,
            disposition: Disposition::Pending,
            reason: None,
        }
    }

    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn is_accepted(&self) -> bool {
        self.disposition == Disposition::Accepted
    }

    pub fn is_rejected(&self) -> bool {
        self.disposition == Disposition::Rejected
    }

    pub fn is_failed(&self) -> bool {
        self.disposition == Disposition::Failed
    }

    /// Mark wanted. Overrides an earlier filter; loses to rejection and
    /// failure.
    pub fn accept(&mut self) {
        match self.disposition {
            Disposition::Pending | Disposition::Filtered => {
                self.disposition = Disposition::Accepted;
                self.reason = None;
            }
            Disposition::Accepted | Disposition::Rejected | Disposition::Failed => {}
        }
    }

    /// Mark passed-over. Only takes effect on pending entries; an accepted
    /// entry stays accepted.
    pub fn filter(&mut self, reason: impl Into<String>) {
        if self.disposition == Disposition::Pending {
            self.disposition = Disposition::Filtered;
            self.reason = Some(reason.into());
        }
    }

    /// Mark unwanted. Overrides acceptance; only a failure is stickier.
    pub fn reject(&mut self, reason: impl Into<String>) {
        match self.disposition {
            Disposition::Failed | Disposition::Rejected => {}
            _ => {
                self.disposition = Disposition::Rejected;
                self.reason = Some(reason.into());
            }
        }
    }

    /// Mark broken. Terminal; the engine reports it to the process-wide
    /// failed list when the entry is purged.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.disposition != Disposition::Failed {
            self.disposition = Disposition::Failed;
            self.reason = Some(reason.into());
        }
    }
}

/// A unit of behavior registered against one or more events.
///
/// Plugins run for a task when the task config carries their name as a key,
/// or when they are builtin and the task has not disabled them. The engine
/// consumes no return value beyond the error signal.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// The events this plugin wants callbacks for.
    fn events(&self) -> &'static [Event];

    /// Default position within an event; lower runs first. Task config can
    /// override this through its `priorities` table.
    fn default_order(&self) -> i64 {
        128
    }

    /// Builtin plugins run for every task unless disabled.
    fn builtin(&self) -> bool {
        false
    }

    async fn on_event(&self, event: Event, task: &mut Task) -> Result<(), PluginError>;
}

/// A resolver turns an indirect url (a landing or search page) into a
/// download-ready one, possibly over several steps.
#[async_trait]
pub trait Resolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this resolver can advance the entry's url. Must stop
    /// claiming resolvability once resolution is done, or the resolve
    /// loop's iteration cap will fail the entry.
    fn resolvable(&self, entry: &Entry) -> bool;

    async fn resolve(&self, entry: &mut Entry) -> Result<(), crate::error::ResolveError>;
}

struct PluginRegistration {
    seq: usize,
    plugin: Arc<dyn Plugin>,
}

/// Typed registry mapping events to ordered plugin lists, built explicitly
/// at startup. Within an event, plugins sort by effective order with
/// registration sequence as the tie-break, so ordering is deterministic.
#[derive(Default)]
pub struct PluginRegistry {
    registrations: Vec<PluginRegistration>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let seq = self.registrations.len();
        self.registrations.push(PluginRegistration { seq, plugin });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.registrations
            .iter()
            .find(|r| r.plugin.name() == name)
            .map(|r| Arc::clone(&r.plugin))
    }

    pub fn plugins(&self) -> impl Iterator<Item = Arc<dyn Plugin>> + '_ {
        self.registrations.iter().map(|r| Arc::clone(&r.plugin))
    }

    /// Plugins registered for `event`, with their registration sequence,
    /// in registration order. The task applies config-based selection and
    /// order overrides on top.
    pub fn for_event(&self, event: Event) -> Vec<(usize, Arc<dyn Plugin>)> {
        self.registrations
            .iter()
            .filter(|r| r.plugin.events().contains(&event))
            .map(|r| (r.seq, Arc::clone(&r.plugin)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

/// Named resolvers in registration order; the resolve loop always asks them
/// in this order and uses the first that claims an entry.
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resolver: Arc<dyn Resolver>) {
        self.resolvers.push(resolver);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Resolver>> {
        self.resolvers.iter()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

/// Per-task effective ordering: config override first, plugin default
/// otherwise.
pub(crate) fn effective_order(
    plugin: &Arc<dyn Plugin>,
    overrides: &HashMap<String, i64>,
) -> i64 {
    overrides
        .get(plugin.name())
        .copied()
        .unwrap_or_else(|| plugin.default_order())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_sequence_order() {
        let seq = Event::MAIN_SEQUENCE;
        assert_eq!(seq.first(), Some(&Event::Start));
        assert_eq!(seq.last(), Some(&Event::Exit));
        assert!(!seq.contains(&Event::Terminate));
        // Resolve sits between filter and download
        let resolve = seq.iter().position(|e| *e == Event::Resolve).unwrap();
        assert_eq!(seq[resolve - 1], Event::Filter);
        assert_eq!(seq[resolve + 1], Event::Download);
    }

    #[test]
    fn test_accept_overrides_filter() {
        let mut te = TaskEntry::new(Entry::new("A", "http://x"));
        te.filter("no match");
        assert_eq!(te.disposition(), Disposition::Filtered);

        te.accept();
        assert_eq!(te.disposition(), Disposition::Accepted);
        assert_eq!(te.reason(), None);
    }

    #[test]
    fn test_filter_after_accept_is_noop() {
        let mut te = TaskEntry::new(Entry::new("A", "http://x"));
        te.accept();
        te.filter("no match");
        assert_eq!(te.disposition(), Disposition::Accepted);
    }

    #[test]
    fn test_reject_wins_over_accept() {
        let mut te = TaskEntry::new(Entry::new("A", "http://x"));
        te.accept();
        te.reject("duplicate");
        assert_eq!(te.disposition(), Disposition::Rejected);

        // and acceptance cannot claw it back
        te.accept();
        assert_eq!(te.disposition(), Disposition::Rejected);
        assert_eq!(te.reason(), Some("duplicate"));
    }

    #[test]
    fn test_transitions_are_idempotent() {
        let mut te = TaskEntry::new(Entry::new("A", "http://x"));
        te.accept();
        te.accept();
        assert_eq!(te.disposition(), Disposition::Accepted);

        te.fail("download error");
        te.fail("second error");
        assert_eq!(te.reason(), Some("download error"));
    }

    #[test]
    fn test_fail_is_terminal() {
        let mut te = TaskEntry::new(Entry::new("A", "http://x"));
        te.fail("boom");
        te.accept();
        te.reject("late");
        assert_eq!(te.disposition(), Disposition::Failed);
    }
}
