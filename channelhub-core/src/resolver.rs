//! Resolution of symbolic "latest" channel pointers against the
//! release feed's tag list.

use regex::Regex;
use tracing::debug;

use crate::error::ConfigError;
use crate::model::ChannelsConfig;

/// What to do when a channel pattern matches none of the feed tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    /// Leave `latest` empty and keep going.
    #[default]
    LeaveEmpty,
    /// Fail the whole reload.
    Fail,
}

/// Fill in `latest` for every channel that declares a pattern instead
/// of a fixed version. Channels with a non-empty `latest` are left
/// untouched; feed order decides ties, so the feed's newest-first
/// convention is preserved as-is.
pub fn resolve_channels(
    config: &mut ChannelsConfig,
    tags: &[String],
    policy: UnresolvedPolicy,
) -> Result<(), ConfigError> {
    for channel in &mut config.channels {
        if !channel.latest.is_empty() || channel.latest_regexp.is_empty() {
            continue;
        }

        match latest_tag(tags, &channel.latest_regexp, &channel.exclude_regexp)? {
            Some(tag) => channel.latest = tag,
            None if policy == UnresolvedPolicy::Fail => {
                return Err(ConfigError::NoMatchingRelease {
                    channel: channel.name.clone(),
                    pattern: channel.latest_regexp.clone(),
                });
            }
            None => debug!(
                "no release matches pattern {:?} for channel {:?}",
                channel.latest_regexp, channel.name
            ),
        }
    }

    Ok(())
}

/// First tag in feed order matching `include` and not matching
/// `exclude`. An empty exclude pattern excludes nothing.
pub fn latest_tag(
    tags: &[String],
    include: &str,
    exclude: &str,
) -> Result<Option<String>, ConfigError> {
    let include = compile(include)?;
    let exclude = if exclude.is_empty() {
        None
    } else {
        Some(compile(exclude)?)
    };

    for tag in tags {
        if !include.is_match(tag) {
            continue;
        }
        if exclude.as_ref().is_some_and(|pattern| pattern.is_match(tag)) {
            continue;
        }
        return Ok(Some(tag.clone()));
    }

    Ok(None)
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}
