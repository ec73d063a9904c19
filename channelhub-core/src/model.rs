//! Document model for channel, release, and app-default metadata.
//!
//! Field names follow the wire format of the YAML document; unknown
//! fields are ignored so older servers keep parsing newer documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Channel section of the document, plus the optional release feed and
/// redirect base it declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<Channel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GitHub>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub redirect_base: String,
}

/// A named upgrade track. `latest` is authoritative when set; otherwise
/// it is resolved from the release feed via `latest_regexp`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub latest: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub latest_regexp: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exclude_regexp: String,
}

/// Release catalog section of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleasesConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub releases: Vec<Release>,
}

/// One release entry with its compatible server-version range and
/// opaque argument bags passed through to clients untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub min_channel_server_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub max_channel_server_version: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub server_args: BTreeMap<String, serde_yaml_ng::Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub agent_args: BTreeMap<String, serde_yaml_ng::Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cni_values: BTreeMap<String, String>,
}

/// App-defaults section of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDefaultsConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub app_defaults: Vec<AppDefault>,
}

/// Default settings for one application; everything beyond the name is
/// opaque to the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDefault {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_name: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml_ng::Value>,
}

/// Release feed coordinates declared by the document. An empty `api`
/// means the public endpoint; a non-empty one addresses a self-hosted
/// instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitHub {
    #[serde(default, rename = "api", skip_serializing_if = "String::is_empty")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
}
