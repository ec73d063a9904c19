//! Failure taxonomy for configuration loading and refresh.

use thiserror::Error;

/// Errors surfaced by the snapshot store and its collaborators.
///
/// Construction-time failures are fatal to the caller; reload-time
/// failures are logged by the refresh loop while readers keep the last
/// good snapshot.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No locators were configured at all.
    #[error("no configuration sources configured")]
    NoSources,

    /// Every configured source failed; carries the last attempt's error.
    #[error("failed to get content from url {url:?}")]
    SourceUnavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The tenant sub-key is absent or its value is not a mapping.
    #[error("failed to find key {key:?} in config")]
    SubKeyNotFound { key: String },

    /// The document (or the selected sub-section) is malformed.
    #[error("failed to parse config document")]
    Document(#[from] serde_yaml_ng::Error),

    /// A channel include/exclude expression does not compile.
    #[error("invalid pattern {pattern:?}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A channel pattern matched nothing under the strict policy.
    #[error("no release matching pattern {pattern:?} for channel {channel:?}")]
    NoMatchingRelease { channel: String, pattern: String },

    /// The configured server version is not a usable semantic version.
    #[error("invalid server version {version:?}")]
    ServerVersion {
        version: String,
        #[source]
        source: semver::Error,
    },

    /// The document's redirect base is not an absolute URL.
    #[error("invalid redirect base {base:?}: {reason}")]
    RedirectBase { base: String, reason: String },

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    /// Listing the release feed failed; no partial tag list is used.
    #[error("release feed unavailable")]
    Feed(#[source] FeedError),

    /// A reload was attempted while another one was still running.
    #[error("configuration is already being loaded")]
    AlreadyLoading,
}

/// Failure to list releases from the feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("release feed request failed")]
    Transport(#[from] reqwest::Error),

    #[error("invalid release feed credential")]
    Credential,
}
