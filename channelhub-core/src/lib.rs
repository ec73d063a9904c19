//! channelhub core: resolves a channel/release metadata document from
//! an ordered list of sources, cross-references a release feed to fill
//! in "latest" pointers, filters releases by server-version
//! compatibility, and publishes the result as an atomically-swapped
//! snapshot refreshed in the background.

pub mod document;
pub mod error;
pub mod feed;
pub mod filter;
pub mod model;
pub mod resolver;
pub mod source;
pub mod store;

pub use error::{ConfigError, FeedError};
pub use resolver::UnresolvedPolicy;
pub use store::{ConfigStore, Snapshot, StoreOptions};
