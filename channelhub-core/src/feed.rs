//! Paginated GitHub release listing used to resolve "latest" pointers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use tracing::debug;

use crate::error::FeedError;

/// Public GitHub API endpoint, used when the document leaves
/// `github.api` empty.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A source of ordered release tag names. The GitHub implementation is
/// the production one; tests substitute their own.
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    /// List non-prerelease tag names in the feed's native order,
    /// newest first. Any page failure fails the whole listing.
    async fn list_release_tags(&self, owner: &str, repo: &str) -> Result<Vec<String>, FeedError>;
}

/// GitHub-backed release feed. Building one is not free (it owns its
/// own HTTP client with credentials baked in), so the store reuses a
/// handle until the endpoint changes.
#[derive(Debug)]
pub struct GitHubFeed {
    client: reqwest::Client,
    api_url: String,
}

impl GitHubFeed {
    /// Address the feed at `api_url` (empty means the public endpoint),
    /// authenticating with `token` when it is non-empty.
    pub fn new(api_url: &str, token: &str) -> Result<Self, FeedError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if !token.is_empty() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| FeedError::Credential)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("channelhub/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_url: normalize_api_url(api_url),
        })
    }

    /// The API base URL this handle addresses.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

fn normalize_api_url(api_url: &str) -> String {
    if api_url.is_empty() {
        DEFAULT_API_URL.to_string()
    } else {
        api_url.trim_end_matches('/').to_string()
    }
}

#[derive(Debug, Deserialize)]
struct FeedRelease {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    prerelease: bool,
}

#[async_trait]
impl ReleaseFeed for GitHubFeed {
    async fn list_release_tags(&self, owner: &str, repo: &str) -> Result<Vec<String>, FeedError> {
        let url = format!("{}/repos/{}/{}/releases", self.api_url, owner, repo);
        let mut tags = Vec::new();
        let mut page = 1u32;

        loop {
            let response = self
                .client
                .get(&url)
                .query(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())])
                .send()
                .await?
                .error_for_status()?;

            let releases: Vec<FeedRelease> = response.json().await?;
            let full_page = releases.len() == PER_PAGE;

            for release in releases {
                if !release.tag_name.is_empty() && !release.prerelease {
                    tags.push(release.tag_name);
                }
            }

            if !full_page {
                break;
            }
            page += 1;
        }

        debug!("listed {} release tags for {}/{}", tags.len(), owner, repo);
        Ok(tags)
    }
}
