use std::fs;
use std::path::PathBuf;

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use tracing::{debug, info};

use crate::cache::session::SessionStore;
use crate::cli::Cli;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::manager::Manager;
use crate::pipeline::task::RunOptions;
use crate::plugins;

/// Execute configured tasks (all, or one by name).
pub async fn run(
    task: Option<String>,
    test: bool,
    learn: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let session = SessionStore::load(Config::session_file()?)?;

    let options = RunOptions {
        test,
        learn,
        ..Default::default()
    };
    if test {
        info!("Test mode: no downloads, session will not be persisted");
    }

    let manager = Manager::new(config, session, options)?;
    let outcomes = manager.run(task.as_deref()).await?;

    if outcomes.is_empty() {
        println!("📋 No tasks configured yet.");
        println!("   Add tasks to your config file and run again.");
        return Ok(());
    }

    let mut aborted = None;
    for outcome in &outcomes {
        match &outcome.aborted {
            Some(reason) => {
                println!("❌ {} aborted: {}", outcome.name, reason);
                aborted = Some((outcome.name.clone(), reason.clone()));
            }
            None => {
                println!(
                    "✅ {}: {} produced, {} accepted, {} rejected, {} filtered, {} failed",
                    outcome.name,
                    outcome.stats.produced,
                    outcome.stats.accepted,
                    outcome.stats.rejected,
                    outcome.stats.filtered,
                    outcome.stats.failed,
                );
            }
        }
    }

    match aborted {
        Some((name, reason)) => Err(Error::TaskAborted(name, reason)),
        None => Ok(()),
    }
}

/// List configured tasks with the plugins each one uses.
pub fn list_tasks(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    if config.tasks.is_empty() {
        println!("📋 No tasks configured yet.");
        return Ok(());
    }

    println!("📋 Configured tasks:");
    for (name, task) in &config.tasks {
        let plugins: Vec<&str> = task.plugins.keys().map(String::as_str).collect();
        println!("\n▶ {}", name);
        println!("   Plugins: {}", plugins.join(", "));
        if !task.disable.is_empty() {
            println!("   Disabled: {}", task.disable.join(", "));
        }
    }

    Ok(())
}

/// List registered plugins with their events and default order.
pub fn list_plugins(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path).unwrap_or_default();
    let (registry, resolvers) = plugins::builtin_registries(&config)?;

    println!("📋 Registered plugins:");
    for plugin in registry.plugins() {
        let events: Vec<&str> = plugin.events().iter().map(|e| e.name()).collect();
        let builtin = if plugin.builtin() { " (builtin)" } else { "" };
        println!(
            "   {:<12} events: {:<24} order: {}{}",
            plugin.name(),
            events.join(", "),
            plugin.default_order(),
            builtin,
        );
    }

    if resolvers.is_empty() {
        println!("\nNo resolvers enabled.");
    } else {
        println!("\nResolvers:");
        for resolver in resolvers.iter() {
            println!("   {}", resolver.name());
        }
    }

    Ok(())
}

/// Show or clear the recent-failures list.
pub fn failed(clear: bool, _config_path: Option<PathBuf>) -> Result<()> {
    let session = SessionStore::load(Config::session_file()?)?;

    if clear {
        session.clear_failed();
        session.save()?;
        println!("✅ Failed list cleared.");
        return Ok(());
    }

    let failed = session.failed();
    if failed.is_empty() {
        println!("📋 No failed entries.");
        return Ok(());
    }

    println!("📋 Recently failed entries:");
    for entry in failed {
        println!(
            "   {} | {} | {}",
            entry.failed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            entry.title,
            entry.reason,
        );
    }

    Ok(())
}

/// Create the configuration and data directories with a default config.
pub fn init(config_path: Option<PathBuf>) -> Result<()> {
    info!("Initializing feedsift configuration");

    let config_file = get_config_file(config_path)?;
    let config_dir = config_file
        .parent()
        .map(PathBuf::from)
        .unwrap_or(Config::config_dir()?);

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
        info!("Created configuration directory: {}", config_dir.display());
    }

    if !config_file.exists() {
        fs::write(&config_file, default_config_template())?;
        info!("Created default configuration: {}", config_file.display());
    } else {
        println!("⚠️  Configuration file already exists: {}", config_file.display());
    }

    let data_dir = Config::data_dir()?;
    if !data_dir.exists() {
        fs::create_dir_all(&data_dir)?;
        info!("Created data directory: {}", data_dir.display());
    }

    println!("✅ feedsift initialized!");
    println!("   Config file: {}", config_file.display());
    println!("   Session file: {}", Config::session_file()?.display());
    println!();
    println!("Next steps:");
    println!("   1. Add tasks to the config file");
    println!("   2. Try them out: feedsift run --test");

    Ok(())
}

pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}

pub fn init_logging(debug: bool, verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(debug)
        .with_line_number(debug)
        .init();

    debug!("Logging initialized");
    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let config_file = get_config_file(config_path)?;
    if !config_file.exists() {
        return Err(Error::NotFound(
            "Configuration file not found. Run 'feedsift init' first.".to_string(),
        ));
    }
    Config::load_with_env(config_file)
}

fn get_config_file(config_path: Option<PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path),
        None => Ok(Config::config_dir()?.join("config.toml")),
    }
}

fn default_config_template() -> String {
    format!(
        r#"# feedsift configuration file
# Generated by feedsift {}

[settings]
# HTTP timeout in seconds
timeout = 30

# Retry attempts for temporary fetch failures
retry_attempts = 3

# Cap on entries taken from a single input
max_entries = 100

[logging]
level = "info"

# Rewrite resolver rules, applied during the resolve phase
# [resolvers]
# rewrite = [
#     {{ pattern = "/details/", replace = "/download/" }},
# ]

# Example task: fetch a feed, keep 1080p releases, download them.
# [tasks.tv.rss]
# url = "https://example.com/feed.xml"
#
# [tasks.tv.regexp]
# accept = ["1080p"]
# reject = ["CAM"]
#
# [tasks.tv.download]
# path = "~/downloads"
"#,
        env!("CARGO_PKG_VERSION")
    )
}
