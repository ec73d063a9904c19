//! Snapshot store: loads the configuration document, resolves it, and
//! refreshes it on a timer while readers keep serving the last good
//! snapshot.
//!
//! Two independent locks: the refresh guard (a `try_lock` mutex, so
//! overlapping reloads fail fast instead of queueing) and the snapshot
//! pointer lock (held only for the swap, never across I/O).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info};

use crate::document;
use crate::error::ConfigError;
use crate::feed::{GitHubFeed, ReleaseFeed, DEFAULT_API_URL};
use crate::filter;
use crate::model::{
    AppDefault, AppDefaultsConfig, Channel, ChannelsConfig, GitHub, Release, ReleasesConfig,
};
use crate::resolver::{self, UnresolvedPolicy};
use crate::source;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one store instance. Multi-tenant deployments run one
/// store per sub-key; stores share nothing.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Ordered fallback list of document locators (paths or URLs).
    pub sources: Vec<String>,
    /// Tenant sub-key the document is scoped to; empty for the whole
    /// document.
    pub sub_key: String,
    /// Server version the release catalog is filtered against; empty
    /// disables filtering.
    pub server_version: String,
    /// Application the app-defaults view is scoped to; empty keeps all
    /// entries.
    pub app_name: String,
    /// Bearer token for the release feed.
    pub github_token: String,
    /// Behavior when a channel pattern matches no feed tag.
    pub unresolved: UnresolvedPolicy,
}

/// Immutable, fully-resolved configuration state. Published atomically;
/// readers holding an `Arc` keep a consistent view across reloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub channels: ChannelsConfig,
    #[serde(flatten)]
    pub releases: ReleasesConfig,
    #[serde(flatten)]
    pub app_defaults: AppDefaultsConfig,
    #[serde(skip)]
    pub redirect: Option<reqwest::Url>,
}

/// Refresh-side state, owned by whoever holds the refresh guard. The
/// fallback source list lives here so only one task can ever trim it.
struct RefreshState {
    sources: Vec<String>,
    feed: Option<Arc<dyn ReleaseFeed>>,
    feed_api_url: String,
}

/// Owns the current snapshot and the machinery to replace it.
pub struct ConfigStore {
    options: StoreOptions,
    http: reqwest::Client,
    feed_override: Option<Arc<dyn ReleaseFeed>>,
    refresh: Mutex<RefreshState>,
    current: RwLock<Arc<Snapshot>>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ConfigStore {
    /// Build a store and perform the initial load. Fails, rather than
    /// producing a store, if that load fails.
    pub async fn new(options: StoreOptions) -> Result<Arc<Self>, ConfigError> {
        Self::build(options, None).await
    }

    /// Like [`ConfigStore::new`] with the GitHub feed replaced, for
    /// embedding and tests.
    pub async fn with_feed(
        options: StoreOptions,
        feed: Arc<dyn ReleaseFeed>,
    ) -> Result<Arc<Self>, ConfigError> {
        Self::build(options, Some(feed)).await
    }

    async fn build(
        options: StoreOptions,
        feed_override: Option<Arc<dyn ReleaseFeed>>,
    ) -> Result<Arc<Self>, ConfigError> {
        if options.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("channelhub/", env!("CARGO_PKG_VERSION")))
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(ConfigError::Client)?;

        info!("loading configuration from {:?}", options.sources);
        let store = Arc::new(Self {
            refresh: Mutex::new(RefreshState {
                sources: options.sources.clone(),
                feed: None,
                feed_api_url: String::new(),
            }),
            current: RwLock::new(Arc::new(Snapshot::default())),
            feed_override,
            options,
            http,
        });

        store.reload().await?;
        info!("loaded initial configuration for {:?}", store.options.sub_key);
        Ok(store)
    }

    /// Reload the configuration from the fallback sources and publish a
    /// new snapshot. A reload overlapping another one returns
    /// [`ConfigError::AlreadyLoading`] immediately, without side
    /// effects; any other failure leaves the published snapshot
    /// untouched.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        let Ok(mut state) = self.refresh.try_lock() else {
            return Err(ConfigError::AlreadyLoading);
        };

        let (content, index) = source::fetch_first(&self.http, &state.sources).await?;

        let mut channels = document::parse_channels(&content, &self.options.sub_key)?;
        let releases = document::parse_releases(&content, &self.options.sub_key)?;
        let app_defaults =
            document::parse_app_defaults(&content, &self.options.sub_key, &self.options.app_name)?;

        let redirect = parse_redirect_base(&channels.redirect_base)?;

        let tags = match channels.github.clone() {
            Some(github) => {
                let feed = self.feed_for(&mut state, &github)?;
                feed.list_release_tags(&github.owner, &github.repo)
                    .await
                    .map_err(ConfigError::Feed)?
            }
            None => Vec::new(),
        };
        resolver::resolve_channels(&mut channels, &tags, self.options.unresolved)?;

        let releases = filter::compatible_releases(releases, &self.options.server_version)?;

        let snapshot = Arc::new(Snapshot {
            channels,
            releases,
            app_defaults,
            redirect,
        });
        *self.current.write().await = snapshot;

        // Keep only the prefix up to the source that answered; later
        // fallbacks are never tried again.
        state.sources.truncate(index + 1);

        Ok(())
    }

    /// Reuse the cached feed handle unless the endpoint changed.
    fn feed_for(
        &self,
        state: &mut RefreshState,
        github: &GitHub,
    ) -> Result<Arc<dyn ReleaseFeed>, ConfigError> {
        if let Some(feed) = &self.feed_override {
            return Ok(feed.clone());
        }

        if let Some(feed) = &state.feed {
            if state.feed_api_url == github.api_url {
                return Ok(feed.clone());
            }
        }

        let endpoint = if github.api_url.is_empty() {
            DEFAULT_API_URL
        } else {
            github.api_url.as_str()
        };
        debug!("building release feed client for {}", endpoint);

        let feed: Arc<dyn ReleaseFeed> = Arc::new(
            GitHubFeed::new(&github.api_url, &self.options.github_token)
                .map_err(ConfigError::Feed)?,
        );
        state.feed = Some(feed.clone());
        state.feed_api_url = github.api_url.clone();
        Ok(feed)
    }

    /// Spawn the background refresh loop. It reloads every `interval`
    /// until `shutdown` fires or its sender is dropped; an in-flight
    /// reload is abandoned on shutdown.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                tokio::select! {
                    _ = shutdown.changed() => break,
                    result = store.reload() => match result {
                        Ok(()) => {
                            info!("reloaded configuration for {:?}", store.options.sub_key);
                        }
                        Err(err) => {
                            error!(
                                "failed to reload configuration for {:?}: {}",
                                store.options.sub_key, err
                            );
                        }
                    },
                }
            }
            debug!("refresh loop for {:?} stopped", store.options.sub_key);
        })
    }

    /// The currently published snapshot.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    /// Channel view, post-resolution.
    pub async fn channels(&self) -> Vec<Channel> {
        self.snapshot().await.channels.channels.clone()
    }

    /// Release view, post-filtering.
    pub async fn releases(&self) -> Vec<Release> {
        self.snapshot().await.releases.releases.clone()
    }

    /// App-defaults view.
    pub async fn app_defaults(&self) -> Vec<AppDefault> {
        self.snapshot().await.app_defaults.app_defaults.clone()
    }

    /// Redirect target for a channel: the document's redirect base
    /// joined with the channel's resolved `latest`. `None` (never an
    /// error) for unknown channels or channels without a resolved
    /// version.
    pub async fn resolve_redirect(&self, name: &str) -> Option<reqwest::Url> {
        let snapshot = self.snapshot().await;
        let base = snapshot.redirect.as_ref()?;
        let channel = snapshot
            .channels
            .channels
            .iter()
            .find(|channel| channel.name == name)?;
        if channel.latest.is_empty() {
            return None;
        }
        base.join(&channel.latest).ok()
    }

    /// Remaining fallback sources, in order. Shrinks over the life of
    /// the store as later fallbacks are discarded.
    pub async fn fallback_sources(&self) -> Vec<String> {
        self.refresh.lock().await.sources.clone()
    }

    /// Tenant sub-key this store is bound to.
    pub fn sub_key(&self) -> &str {
        &self.options.sub_key
    }
}

fn parse_redirect_base(base: &str) -> Result<Option<reqwest::Url>, ConfigError> {
    if base.is_empty() {
        return Ok(None);
    }
    reqwest::Url::parse(base)
        .map(Some)
        .map_err(|err| ConfigError::RedirectBase {
            base: base.to_string(),
            reason: err.to_string(),
        })
}
