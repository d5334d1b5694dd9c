use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedsift::cache::session::SessionStore;
use feedsift::config::Config;
use feedsift::entry::Entry;
use feedsift::error::PluginError;
use feedsift::manager::Manager;
use feedsift::pipeline::task::{EngineContext, RunOptions, Task};
use feedsift::pipeline::{Event, Plugin, PluginRegistry, ResolverRegistry};

/// End-to-end tests driving the whole pipeline: config, manager, built-in
/// plugins, resolvers, and session state.

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
    <channel>
        <title>Release Feed</title>
        <link>https://example.com</link>
        <item>
            <title>Show S01E01 1080p</title>
            <link>__BASE__/details/1.torrent</link>
            <guid>release-1</guid>
        </item>
        <item>
            <title>Show S01E01 CAM</title>
            <link>__BASE__/details/2.torrent</link>
            <guid>release-2</guid>
        </item>
    </channel>
</rss>"#;

async fn release_site() -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(FEED.replace("__BASE__", &mock_server.uri()))
                .insert_header("content-type", "application/rss+xml"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/1.torrent"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"torrent payload".to_vec()))
        .mount(&mock_server)
        .await;

    mock_server
}

fn site_config(base: &str, download_dir: &std::path::Path) -> Config {
    let toml = format!(
        r#"
[resolvers]
rewrite = [
    {{ pattern = "/details/", replace = "/files/" }},
]

[tasks.tv.rss]
url = "{base}/feed.xml"

[tasks.tv.regexp]
accept = ["1080p"]
reject = ["CAM"]

[tasks.tv.download]
path = "{dir}"
"#,
        base = base,
        dir = download_dir.display(),
    );
    toml::from_str(&toml).unwrap()
}

#[tokio::test]
async fn test_full_pipeline_fetch_filter_resolve_download() {
    let site = release_site().await;
    let download_dir = TempDir::new().unwrap();
    let config = site_config(&site.uri(), download_dir.path());

    let manager = Manager::new(config, SessionStore::in_memory(), RunOptions::default()).unwrap();
    let outcomes = manager.run(None).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert!(outcome.succeeded());
    assert_eq!(outcome.stats.produced, 2);
    assert_eq!(outcome.stats.accepted, 1);
    assert_eq!(outcome.stats.rejected, 1);

    // The CAM release never reached the download directory; the accepted
    // one was fetched through the rewritten url.
    let target = download_dir.path().join("Show S01E01 1080p.torrent");
    assert_eq!(std::fs::read(&target).unwrap(), b"torrent payload");
    assert_eq!(std::fs::read_dir(download_dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_second_run_dedups_through_seen() {
    let site = release_site().await;
    let download_dir = TempDir::new().unwrap();
    let config = site_config(&site.uri(), download_dir.path());

    let manager = Manager::new(config, SessionStore::in_memory(), RunOptions::default()).unwrap();

    let first = manager.run(None).await.unwrap();
    assert_eq!(first[0].stats.accepted, 1);

    let second = manager.run(None).await.unwrap();
    assert_eq!(second[0].stats.accepted, 0);
    assert_eq!(second[0].stats.rejected, 2);
}

#[tokio::test]
async fn test_seen_state_survives_session_reload() {
    let site = release_site().await;
    let download_dir = TempDir::new().unwrap();
    let session_dir = TempDir::new().unwrap();
    let session_path = session_dir.path().join("session.json");

    {
        let session = SessionStore::load(&session_path).unwrap();
        let config = site_config(&site.uri(), download_dir.path());
        let manager = Manager::new(config, session, RunOptions::default()).unwrap();
        let outcomes = manager.run(None).await.unwrap();
        assert_eq!(outcomes[0].stats.accepted, 1);
    }

    // A fresh process loads the persisted session and skips everything.
    let session = SessionStore::load(&session_path).unwrap();
    let config = site_config(&site.uri(), download_dir.path());
    let manager = Manager::new(config, session, RunOptions::default()).unwrap();
    let outcomes = manager.run(None).await.unwrap();
    assert_eq!(outcomes[0].stats.accepted, 0);
}

#[tokio::test]
async fn test_test_mode_never_persists() {
    let site = release_site().await;
    let download_dir = TempDir::new().unwrap();
    let session_dir = TempDir::new().unwrap();
    let session_path = session_dir.path().join("session.json");

    let session = SessionStore::load(&session_path).unwrap();
    let config = site_config(&site.uri(), download_dir.path());
    let options = RunOptions {
        test: true,
        ..Default::default()
    };
    let manager = Manager::new(config, session, options).unwrap();
    let outcomes = manager.run(None).await.unwrap();

    assert!(outcomes[0].succeeded());
    assert!(!session_path.exists());
    assert_eq!(std::fs::read_dir(download_dir.path()).unwrap().count(), 0);
}

struct MixedInput;

#[async_trait]
impl Plugin for MixedInput {
    fn name(&self) -> &'static str {
        "mixed_input"
    }
    fn events(&self) -> &'static [Event] {
        &[Event::Input]
    }
    async fn on_event(&self, _event: Event, task: &mut Task) -> Result<(), PluginError> {
        task.add_entry(Entry::new("A", "http://x/a"));
        task.add_entry(Entry::with_title("B"));
        Ok(())
    }
}

struct AcceptValid;

#[async_trait]
impl Plugin for AcceptValid {
    fn name(&self) -> &'static str {
        "accept_valid"
    }
    fn events(&self) -> &'static [Event] {
        &[Event::Filter]
    }
    async fn on_event(&self, _event: Event, task: &mut Task) -> Result<(), PluginError> {
        for te in task.entries_mut() {
            if te.entry.is_valid() {
                te.accept();
            }
        }
        Ok(())
    }
}

struct OutputInspector {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Plugin for OutputInspector {
    fn name(&self) -> &'static str {
        "output_inspector"
    }
    fn events(&self) -> &'static [Event] {
        &[Event::Output]
    }
    async fn on_event(&self, _event: Event, task: &mut Task) -> Result<(), PluginError> {
        for te in task.entries() {
            self.seen.lock().push(te.entry.title().unwrap().to_string());
        }
        Ok(())
    }
}

fn custom_manager(
    config_toml: &str,
    extra: Vec<Arc<dyn Plugin>>,
) -> (Manager, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = PluginRegistry::new();
    for plugin in extra {
        registry.register(plugin);
    }
    registry.register(Arc::new(OutputInspector {
        seen: Arc::clone(&seen),
    }));

    let manager = Manager::with_context(
        toml::from_str(config_toml).unwrap(),
        SessionStore::in_memory(),
        EngineContext {
            plugins: Arc::new(registry),
            resolvers: Arc::new(ResolverRegistry::new()),
            options: RunOptions::default(),
        },
    );
    (manager, seen)
}

#[tokio::test]
async fn test_url_less_entries_are_valid() {
    let (manager, seen) = custom_manager(
        r#"
[tasks.t.mixed_input]
[tasks.t.accept_valid]
[tasks.t.output_inspector]
"#,
        vec![Arc::new(MixedInput) as Arc<dyn Plugin>, Arc::new(AcceptValid)],
    );

    let outcomes = manager.run(None).await.unwrap();
    assert_eq!(outcomes[0].stats.accepted, 2);
    // B has no url but a title, so it is valid and flows to output
    assert_eq!(*seen.lock(), vec!["A".to_string(), "B".to_string()]);
}

struct RejectB;

#[async_trait]
impl Plugin for RejectB {
    fn name(&self) -> &'static str {
        "reject_b"
    }
    fn events(&self) -> &'static [Event] {
        &[Event::Filter]
    }
    async fn on_event(&self, _event: Event, task: &mut Task) -> Result<(), PluginError> {
        for te in task.entries_mut() {
            if te.entry.title() == Some("B") {
                te.reject("not wanted");
            } else {
                te.accept();
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_rejected_entry_absent_downstream() {
    let (manager, seen) = custom_manager(
        r#"
[tasks.t.mixed_input]
[tasks.t.reject_b]
[tasks.t.output_inspector]
"#,
        vec![Arc::new(MixedInput) as Arc<dyn Plugin>, Arc::new(RejectB)],
    );

    let outcomes = manager.run(None).await.unwrap();
    assert_eq!(outcomes[0].stats.rejected, 1);
    assert_eq!(*seen.lock(), vec!["A".to_string()]);
}

#[tokio::test]
async fn test_resolver_failures_reach_the_failed_list() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(FEED.replace("__BASE__", &site.uri()))
                .insert_header("content-type", "application/rss+xml"),
        )
        .mount(&site)
        .await;

    // A rewrite rule that keeps matching its own output: the loop guard
    // fails the affected entries, and the failures land on the list.
    let toml = format!(
        r#"
[resolvers]
rewrite = [
    {{ pattern = "/details/", replace = "/details/x/" }},
]

[tasks.tv.rss]
url = "{}/feed.xml"
"#,
        site.uri()
    );
    let config: Config = toml::from_str(&toml).unwrap();

    let manager = Manager::new(config, SessionStore::in_memory(), RunOptions::default()).unwrap();
    let outcomes = manager.run(None).await.unwrap();

    assert!(outcomes[0].succeeded());
    assert_eq!(outcomes[0].stats.failed, 2);

    let failed = manager.failed_entries();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|f| f.reason.contains("gave up")));
}
