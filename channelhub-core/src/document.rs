//! Typed views over the raw configuration document.
//!
//! Each view is parsed independently from the same bytes. When a tenant
//! sub-key is set, the document is first read as a generic mapping and
//! the view is taken from the nested section under that key.

use serde::de::DeserializeOwned;

use crate::error::ConfigError;
use crate::model::{AppDefaultsConfig, ChannelsConfig, ReleasesConfig};

/// Parse the channel section, including the optional release feed and
/// redirect base declarations.
pub fn parse_channels(content: &[u8], sub_key: &str) -> Result<ChannelsConfig, ConfigError> {
    parse_view(content, sub_key)
}

/// Parse the full release catalog. Compatibility filtering against a
/// server version is a separate step, see [`crate::filter`].
pub fn parse_releases(content: &[u8], sub_key: &str) -> Result<ReleasesConfig, ConfigError> {
    parse_view(content, sub_key)
}

/// Parse the app-defaults section, scoped to `app_name` when set.
pub fn parse_app_defaults(
    content: &[u8],
    sub_key: &str,
    app_name: &str,
) -> Result<AppDefaultsConfig, ConfigError> {
    let mut config: AppDefaultsConfig = parse_view(content, sub_key)?;
    if !app_name.is_empty() {
        config.app_defaults.retain(|entry| entry.app_name == app_name);
    }
    Ok(config)
}

fn parse_view<T: DeserializeOwned>(content: &[u8], sub_key: &str) -> Result<T, ConfigError> {
    if sub_key.is_empty() {
        return Ok(serde_yaml_ng::from_slice(content)?);
    }

    let document: serde_yaml_ng::Value = serde_yaml_ng::from_slice(content)?;
    let section = document
        .get(sub_key)
        .filter(|value| value.is_mapping())
        .ok_or_else(|| ConfigError::SubKeyNotFound {
            key: sub_key.to_string(),
        })?;
    Ok(serde_yaml_ng::from_value(section.clone())?)
}
