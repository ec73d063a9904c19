//! Store lifecycle: initial load, fallback trimming, refresh behavior,
//! and the read views.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{watch, Notify};

use channelhub_core::error::FeedError;
use channelhub_core::feed::ReleaseFeed;
use channelhub_core::{ConfigError, ConfigStore, StoreOptions, UnresolvedPolicy};

const DOC: &str = r#"
channels:
- name: stable
  latest: v1.31.2+k3s1
- name: testing
  latestRegexp: ^v\d+\.\d+\.\d+$
  excludeRegexp: -rc
releases:
- version: v1.31.2+k3s1
  minChannelServerVersion: 2.9.0
  maxChannelServerVersion: 2.10.99
- version: v1.28.5+k3s1
  minChannelServerVersion: 2.7.0
  maxChannelServerVersion: 2.8.99
appDefaults:
- appName: fleet
  defaults:
    chart: fleet-crd
redirectBase: https://example.com/releases/tag/
"#;

fn write_doc(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}

fn options(sources: Vec<String>) -> StoreOptions {
    StoreOptions {
        sources,
        ..Default::default()
    }
}

struct StaticFeed {
    tags: Vec<String>,
}

#[async_trait]
impl ReleaseFeed for StaticFeed {
    async fn list_release_tags(&self, _owner: &str, _repo: &str) -> Result<Vec<String>, FeedError> {
        Ok(self.tags.clone())
    }
}

/// Passes the initial load through, then blocks every later listing
/// until released, so tests can hold a reload open deterministically.
struct BlockingFeed {
    calls: AtomicUsize,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl ReleaseFeed for BlockingFeed {
    async fn list_release_tags(&self, _owner: &str, _repo: &str) -> Result<Vec<String>, FeedError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(Vec::new());
        }
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn initial_load_populates_the_views() {
    let dir = TempDir::new().unwrap();
    let source = write_doc(&dir, "channels.yaml", DOC);
    let store = ConfigStore::new(options(vec![source])).await.unwrap();

    let channels = store.channels().await;
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].latest, "v1.31.2+k3s1");

    let releases = store.releases().await;
    assert_eq!(releases.len(), 2);

    let app_defaults = store.app_defaults().await;
    assert_eq!(app_defaults.len(), 1);
    assert_eq!(app_defaults[0].app_name, "fleet");
}

#[tokio::test]
async fn construction_fails_when_every_source_fails() {
    let err = ConfigStore::new(options(vec!["/nonexistent/channels.yaml".to_string()]))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::SourceUnavailable { .. }));
}

#[tokio::test]
async fn construction_fails_without_sources() {
    let err = ConfigStore::new(options(Vec::new())).await.unwrap_err();
    assert!(matches!(err, ConfigError::NoSources));
}

#[tokio::test]
async fn construction_fails_on_a_malformed_document() {
    let dir = TempDir::new().unwrap();
    let source = write_doc(&dir, "channels.yaml", "channels: [ {{ broken");
    let err = ConfigStore::new(options(vec![source])).await.unwrap_err();
    assert!(matches!(err, ConfigError::Document(_)));
}

#[tokio::test]
async fn sub_key_scopes_the_store_to_one_tenant() {
    let dir = TempDir::new().unwrap();
    let nested: String = format!(
        "k3s:\n{}",
        DOC.lines()
            .map(|l| if l.is_empty() { String::new() } else { format!("  {l}") })
            .collect::<Vec<_>>()
            .join("\n")
    );
    let source = write_doc(&dir, "channels.yaml", &nested);

    let mut opts = options(vec![source.clone()]);
    opts.sub_key = "k3s".to_string();
    let store = ConfigStore::new(opts).await.unwrap();
    assert_eq!(store.channels().await.len(), 2);

    let mut opts = options(vec![source]);
    opts.sub_key = "rke2".to_string();
    let err = ConfigStore::new(opts).await.unwrap_err();
    assert!(matches!(err, ConfigError::SubKeyNotFound { .. }));
}

#[tokio::test]
async fn successful_load_trims_the_fallback_list() {
    let dir = TempDir::new().unwrap();
    let good1 = write_doc(&dir, "good1.yaml", DOC);
    let good2 = write_doc(&dir, "good2.yaml", DOC);
    let missing = dir.path().join("missing.yaml").to_string_lossy().to_string();

    let store = ConfigStore::new(options(vec![missing.clone(), good1.clone(), good2.clone()]))
        .await
        .unwrap();

    // Trimmed to the prefix ending at the source that answered.
    assert_eq!(store.fallback_sources().await, vec![missing, good1.clone()]);

    // The discarded suffix is never retried: with good1 gone, the
    // reload fails even though good2 still exists and would parse.
    std::fs::remove_file(&good1).unwrap();
    let err = store.reload().await.unwrap_err();
    match err {
        ConfigError::SourceUnavailable { url, .. } => assert_eq!(url, good1),
        other => panic!("unexpected error: {other}"),
    }

    // The previous snapshot keeps serving.
    assert_eq!(store.channels().await.len(), 2);
}

#[tokio::test]
async fn failed_reload_keeps_the_published_snapshot() {
    let dir = TempDir::new().unwrap();
    let source = write_doc(&dir, "channels.yaml", DOC);
    let store = ConfigStore::new(options(vec![source.clone()])).await.unwrap();
    let before = store.snapshot().await;

    std::fs::write(&source, "channels: [ {{ broken").unwrap();
    let err = store.reload().await.unwrap_err();
    assert!(matches!(err, ConfigError::Document(_)));

    let after = store.snapshot().await;
    assert_eq!(*before, *after);
}

#[tokio::test]
async fn feed_tags_resolve_pattern_channels() {
    let dir = TempDir::new().unwrap();
    let doc = format!("{DOC}github:\n  owner: example\n  repo: example\n");
    let source = write_doc(&dir, "channels.yaml", &doc);

    let feed = Arc::new(StaticFeed {
        tags: vec![
            "v2.1.0-rc1".to_string(),
            "v2.0.0".to_string(),
            "v1.9.0".to_string(),
        ],
    });
    let store = ConfigStore::with_feed(options(vec![source]), feed)
        .await
        .unwrap();

    let channels = store.channels().await;
    // Fixed latest untouched, pattern channel resolved past the
    // excluded release candidate.
    assert_eq!(channels[0].latest, "v1.31.2+k3s1");
    assert_eq!(channels[1].latest, "v2.0.0");
}

#[tokio::test]
async fn zero_match_patterns_fail_only_under_the_strict_policy() {
    let dir = TempDir::new().unwrap();
    let doc = format!("{DOC}github:\n  owner: example\n  repo: example\n");
    let source = write_doc(&dir, "channels.yaml", &doc);
    let feed = Arc::new(StaticFeed {
        tags: vec!["nightly-build".to_string()],
    });

    let store = ConfigStore::with_feed(options(vec![source.clone()]), feed.clone())
        .await
        .unwrap();
    assert_eq!(store.channels().await[1].latest, "");

    let mut opts = options(vec![source]);
    opts.unresolved = UnresolvedPolicy::Fail;
    let err = ConfigStore::with_feed(opts, feed).await.unwrap_err();
    assert!(matches!(err, ConfigError::NoMatchingRelease { .. }));
}

#[tokio::test]
async fn server_version_filters_the_release_catalog() {
    let dir = TempDir::new().unwrap();
    let source = write_doc(&dir, "channels.yaml", DOC);

    let mut opts = options(vec![source]);
    opts.server_version = "2.9.5".to_string();
    let store = ConfigStore::new(opts).await.unwrap();

    let releases = store.releases().await;
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].version, "v1.31.2+k3s1");
}

#[tokio::test]
async fn redirects_join_the_base_with_the_resolved_latest() {
    let dir = TempDir::new().unwrap();
    let source = write_doc(&dir, "channels.yaml", DOC);
    let store = ConfigStore::new(options(vec![source])).await.unwrap();

    let url = store.resolve_redirect("stable").await.unwrap();
    assert_eq!(
        url.as_str(),
        "https://example.com/releases/tag/v1.31.2+k3s1"
    );

    // Unknown channel and unresolved channel both yield nothing.
    assert!(store.resolve_redirect("nope").await.is_none());
    assert!(store.resolve_redirect("testing").await.is_none());
}

#[tokio::test]
async fn overlapping_reloads_fail_fast() {
    let dir = TempDir::new().unwrap();
    let doc = format!("{DOC}github:\n  owner: example\n  repo: example\n");
    let source = write_doc(&dir, "channels.yaml", &doc);

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let feed = Arc::new(BlockingFeed {
        calls: AtomicUsize::new(0),
        entered: entered.clone(),
        release: release.clone(),
    });

    let store = ConfigStore::with_feed(options(vec![source]), feed)
        .await
        .unwrap();

    let background = {
        let store = store.clone();
        tokio::spawn(async move { store.reload().await })
    };
    entered.notified().await;

    // The guard is held by the in-flight reload.
    let err = store.reload().await.unwrap_err();
    assert!(matches!(err, ConfigError::AlreadyLoading));

    release.notify_one();
    background.await.unwrap().unwrap();

    // With the guard free again, reloads proceed.
    release.notify_one();
    let second = {
        let store = store.clone();
        tokio::spawn(async move { store.reload().await })
    };
    entered.notified().await;
    release.notify_one();
    second.await.unwrap().unwrap();
}

#[tokio::test]
async fn refresh_loop_publishes_changes_and_stops_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let source = write_doc(&dir, "channels.yaml", DOC);
    let store = ConfigStore::new(options(vec![source.clone()])).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = store.spawn_refresh(Duration::from_millis(20), shutdown_rx);

    std::fs::write(&source, DOC.replace("v1.31.2+k3s1", "v1.32.0+k3s1")).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if store.channels().await[0].latest == "v1.32.0+k3s1" {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "refresh loop never picked up the new document"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}
