use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::config::RewriteRule;
use crate::entry::Entry;
use crate::error::ResolveError;
use crate::pipeline::Resolver;

/// Resolver rewriting urls by regex, rule by rule, until no rule changes
/// the url anymore. The usual shape is turning a landing page into a direct
/// link:
///
/// ```toml
/// [resolvers]
/// rewrite = [
///     { pattern = "/details/", replace = "/download/" },
/// ]
/// ```
pub struct RewriteResolver {
    rules: Vec<CompiledRule>,
}

struct CompiledRule {
    source: String,
    pattern: Regex,
    replace: String,
}

impl RewriteResolver {
    pub fn from_rules(rules: &[RewriteRule]) -> crate::Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern).map(|pattern| CompiledRule {
                    source: rule.pattern.clone(),
                    pattern,
                    replace: rule.replace.clone(),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    /// The rewritten url, when some rule actually changes it.
    fn rewritten(&self, url: &str) -> Option<(String, String)> {
        for rule in &self.rules {
            if rule.pattern.is_match(url) {
                let new_url = rule.pattern.replace(url, rule.replace.as_str()).to_string();
                if new_url != url {
                    return Some((new_url, rule.source.clone()));
                }
            }
        }
        None
    }
}

#[async_trait]
impl Resolver for RewriteResolver {
    fn name(&self) -> &'static str {
        "rewrite"
    }

    fn resolvable(&self, entry: &Entry) -> bool {
        entry
            .url()
            .map(|url| self.rewritten(url).is_some())
            .unwrap_or(false)
    }

    async fn resolve(&self, entry: &mut Entry) -> Result<(), ResolveError> {
        let url = entry
            .url()
            .ok_or_else(|| ResolveError::Failed("entry has no url".into()))?;
        let (new_url, rule) = self
            .rewritten(url)
            .ok_or_else(|| ResolveError::Failed("no rewrite rule matched".into()))?;

        debug!("rewrite: {} -> {} (rule '{}')", url, new_url, rule);
        entry.set_url(new_url);
        Ok(())
    }
}
