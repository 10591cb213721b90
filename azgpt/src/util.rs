//! Small shared helpers: wall-clock timestamps and per-user paths.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// File name of the token cache inside the home directory.
pub const TOKEN_CACHE_FILE: &str = ".azure-gpt-config.json";

/// Get current timestamp in milliseconds since Unix epoch.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn timestamp_ms() -> u64 {
    // Truncation is safe: timestamp won't overflow u64 for ~500 million years
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
#[inline]
#[must_use]
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Get the user's home directory.
#[must_use]
pub fn home_dir() -> PathBuf {
    dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Get the default token cache path (`~/.azure-gpt-config.json`).
#[must_use]
pub fn token_cache_path() -> PathBuf {
    home_dir().join(TOKEN_CACHE_FILE)
}

/// Prefixes `https://` unless the endpoint already names a scheme.
#[must_use]
pub fn with_scheme(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_owned()
    } else {
        format!("https://{endpoint}")
    }
}
