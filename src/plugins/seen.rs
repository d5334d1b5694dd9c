use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::entry::Entry;
use crate::error::PluginError;
use crate::pipeline::task::Task;
use crate::pipeline::{Event, Plugin};

/// How long a seen digest is remembered.
const SEEN_TTL_DAYS: u32 = 365;

/// Builtin filter rejecting entries already processed by any earlier run of
/// any task. Digests live in the shared cache, so two tasks watching
/// overlapping feeds dedup against each other.
///
/// Entries are keyed by their original url (the url as the input produced
/// it, before resolvers rewrote it), falling back to the title for url-less
/// entries. Accepted entries are recorded at the exit event — which learn
/// mode still reaches, so a `--learn` run teaches the filter without
/// downloading anything.
pub struct SeenFilter;

fn digest(entry: &Entry) -> Option<String> {
    let key = entry
        .original_url()
        .or_else(|| entry.url())
        .or_else(|| entry.title())?;
    Some(blake3::hash(key.as_bytes()).to_hex().to_string())
}

#[async_trait]
impl Plugin for SeenFilter {
    fn name(&self) -> &'static str {
        "seen"
    }

    fn events(&self) -> &'static [Event] {
        &[Event::Filter, Event::Exit]
    }

    /// Runs before other filters so known entries drop out early.
    fn default_order(&self) -> i64 {
        0
    }

    fn builtin(&self) -> bool {
        true
    }

    async fn on_event(&self, event: Event, task: &mut Task) -> Result<(), PluginError> {
        let cache = task.shared_cache().clone();

        match event {
            Event::Filter => {
                for te in task.entries_mut() {
                    let Some(key) = digest(&te.entry) else {
                        continue;
                    };
                    if cache.get(&key).is_some() {
                        debug!("seen: rejecting '{}'", te.entry.describe());
                        te.reject("already seen");
                    }
                }
            }
            Event::Exit => {
                for te in task.entries_mut() {
                    if !te.is_accepted() {
                        continue;
                    }
                    let Some(key) = digest(&te.entry) else {
                        continue;
                    };
                    let title = te.entry.title().unwrap_or_default();
                    cache.store_for(&key, json!(title), SEEN_TTL_DAYS);
                }
            }
            _ => {}
        }

        Ok(())
    }
}
