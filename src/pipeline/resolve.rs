use serde_json::json;
use tracing::{debug, error};

use crate::cache::ScopedCache;
use crate::entry::Entry;
use crate::error::ResolveError;
use crate::pipeline::ResolverRegistry;

/// Hard cap on resolve iterations per entry. A resolver that keeps claiming
/// an entry is resolvable after resolving it violates the resolver contract;
/// the cap turns that into an entry failure instead of a hang.
pub const RESOLVE_ATTEMPT_CAP: usize = 300;

/// Shared-cache namespace holding per-URL resolve failure counters.
pub const FAILURE_NAMESPACE: &str = "resolve_failures";

/// Drive one entry to a download-ready url.
///
/// Each iteration re-scans the registry in registration order and hands the
/// entry to the first resolver claiming it; resolvability is re-evaluated
/// from scratch after every attempt so chained resolvers compose. Returns
/// once no resolver claims the entry.
pub async fn resolve_entry(
    registry: &ResolverRegistry,
    entry: &mut Entry,
    failure_counts: &ScopedCache,
) -> Result<(), ResolveError> {
    for _ in 0..RESOLVE_ATTEMPT_CAP {
        let Some(resolver) = registry.iter().find(|r| r.resolvable(entry)) else {
            return Ok(());
        };
        let name = resolver.name();
        debug!("Resolving '{}' with '{}'", entry.describe(), name);

        match resolver.resolve(entry).await {
            Ok(()) => {}
            Err(ResolveError::Failed(msg)) => {
                record_failure(failure_counts, entry);
                return Err(ResolveError::Failed(format!("resolver '{}': {}", name, msg)));
            }
            Err(other) => {
                error!(
                    "Resolver '{}' errored unexpectedly on '{}': {}",
                    name,
                    entry.describe(),
                    other
                );
                return Err(ResolveError::Internal(format!("resolver '{}': {}", name, other)));
            }
        }
    }

    Err(ResolveError::Loop {
        entry: entry.describe(),
        attempts: RESOLVE_ATTEMPT_CAP,
    })
}

fn record_failure(counts: &ScopedCache, entry: &Entry) {
    let Some(url) = entry.url() else {
        return;
    };
    let count = counts.get(url).and_then(|v| v.as_u64()).unwrap_or(0) + 1;
    counts.store(url, json!(count));
    debug!("Recorded resolve failure #{} for {}", count, url);
}
