pub mod download;
pub mod regexp;
pub mod rewrite;
pub mod rss;
pub mod seen;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{PluginRegistry, ResolverRegistry};

/// Build the registries with the built-in plugin set. Registration order is
/// the ordering tie-break, so it is part of observable behavior.
pub fn builtin_registries(config: &Config) -> Result<(PluginRegistry, ResolverRegistry)> {
    let mut plugins = PluginRegistry::new();
    plugins.register(Arc::new(rss::RssInput::new(&config.settings)));
    plugins.register(Arc::new(seen::SeenFilter));
    plugins.register(Arc::new(regexp::RegexpFilter));
    plugins.register(Arc::new(download::DownloadOutput::new(&config.settings)));

    let mut resolvers = ResolverRegistry::new();
    if !config.resolvers.rewrite.is_empty() {
        resolvers.register(Arc::new(rewrite::RewriteResolver::from_rules(
            &config.resolvers.rewrite,
        )?));
    }

    Ok((plugins, resolvers))
}
