//! Ordered-fallback retrieval of the configuration document.
//!
//! A locator is tried as a local file path first and as an HTTP(S) URL
//! second. The first locator that yields bytes wins; nothing is merged
//! across locators.

use tracing::debug;

use crate::error::ConfigError;

/// Fetch the first retrievable source from `locators`, returning the
/// document bytes and the index of the locator that produced them.
///
/// Fails only when every locator fails, carrying the last error.
pub async fn fetch_first(
    client: &reqwest::Client,
    locators: &[String],
) -> Result<(Vec<u8>, usize), ConfigError> {
    let mut failure = None;
    for (index, locator) in locators.iter().enumerate() {
        match fetch_bytes(client, locator).await {
            Ok(content) => {
                debug!("fetched configuration from {}", locator);
                return Ok((content, index));
            }
            Err(source) => {
                debug!("configuration source {} unavailable: {}", locator, source);
                failure = Some(ConfigError::SourceUnavailable {
                    url: locator.clone(),
                    source,
                });
            }
        }
    }
    Err(failure.unwrap_or(ConfigError::NoSources))
}

/// Fetch one locator: local file read, then HTTP GET.
async fn fetch_bytes(client: &reqwest::Client, locator: &str) -> Result<Vec<u8>, reqwest::Error> {
    match tokio::fs::read(locator).await {
        Ok(content) => return Ok(content),
        Err(err) => debug!("{} is not a readable file ({}), trying as URL", locator, err),
    }

    let response = client.get(locator).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}
