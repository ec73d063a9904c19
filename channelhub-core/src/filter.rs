//! Server-version compatibility filtering for the release catalog.

use semver::Version;

use crate::error::ConfigError;
use crate::model::ReleasesConfig;

/// Keep the releases whose declared `[min, max]` server-version range
/// contains `server_version`, inclusive on both ends.
///
/// An empty `server_version` disables filtering. Entries whose declared
/// bounds do not parse are dropped silently; input order is preserved.
pub fn compatible_releases(
    config: ReleasesConfig,
    server_version: &str,
) -> Result<ReleasesConfig, ConfigError> {
    if server_version.is_empty() {
        return Ok(config);
    }

    let server = parse_tolerant(server_version).map_err(|source| ConfigError::ServerVersion {
        version: server_version.to_string(),
        source,
    })?;

    let releases = config
        .releases
        .into_iter()
        .filter(|release| {
            let Ok(min) = parse_tolerant(&release.min_channel_server_version) else {
                return false;
            };
            let Ok(max) = parse_tolerant(&release.max_channel_server_version) else {
                return false;
            };
            min <= server && server <= max
        })
        .collect();

    Ok(ReleasesConfig { releases })
}

/// Parse a version leniently: surrounding whitespace and a leading `v`
/// are accepted, and partial `MAJOR` / `MAJOR.MINOR` forms are padded
/// with zeroes.
pub(crate) fn parse_tolerant(input: &str) -> Result<Version, semver::Error> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);

    match Version::parse(trimmed) {
        Ok(version) => Ok(version),
        Err(err) => {
            let (core, suffix) = match trimmed.find(['-', '+']) {
                Some(at) => trimmed.split_at(at),
                None => (trimmed, ""),
            };
            let missing = 2usize.saturating_sub(core.matches('.').count());
            if core.is_empty() || missing == 0 {
                return Err(err);
            }
            let mut padded = core.to_string();
            for _ in 0..missing {
                padded.push_str(".0");
            }
            padded.push_str(suffix);
            Version::parse(&padded)
        }
    }
}
