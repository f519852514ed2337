use std::{path::Path, time::Duration};

use blake3::Hash;

use crate::error::{ColonyError, Result};

/// Parses a human readable duration such as `5m`, `30s` or `1h30m`.
pub fn parse_duration(text: &str) -> Result<Duration> {
    text.parse::<humantime::Duration>()
        .map(Into::into)
        .map_err(|e| {
            ColonyError::Config(format!(
                "invalid duration '{}': {} (use a format like '5m', '30s', '1h30m')",
                text, e
            ))
        })
}

/// Picks the task's own timeout over the default. `"0"` or an empty string
/// disables the timeout.
pub fn parse_timeout(
    timeout_str: Option<&str>,
    default_timeout: Option<&str>,
) -> Result<Option<Duration>> {
    let Some(timeout_to_parse) = timeout_str.or(default_timeout) else {
        return Ok(None);
    };

    if timeout_to_parse == "0" || timeout_to_parse.is_empty() {
        return Ok(None);
    }

    parse_duration(timeout_to_parse).map(Some)
}

/// BLAKE3 digest of a file's contents.
pub async fn hash_file(path: &Path) -> std::io::Result<Hash> {
    let contents = tokio::fs::read(path).await?;
    Ok(blake3::hash(&contents))
}
