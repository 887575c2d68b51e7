//! Runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Filename pattern of the usual snapshot naming convention: a `model`
/// prefix, an arbitrary suffix, and an `.h5` extension.
pub const DEFAULT_FILTER: &str = r"model.*\.h5$";

/// How long idle or paused maintenance ticks sleep before re-checking.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Default maximum number of resident cache entries.
pub const DEFAULT_CACHE_LIMIT: usize = 100;

/// Configuration for a [`PrefetchCache`](crate::cache::PrefetchCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheConfig {
    /// Maximum number of resident cache entries. A foreground `get` may
    /// exceed this by one until the next maintenance tick trims it back.
    pub cache_limit: usize,

    /// Sleep applied by the maintenance loop when paused or when a tick has
    /// nothing to load.
    pub backoff: Duration,

    /// Regular expression tested against each directory-entry name to build
    /// the listing.
    pub filter: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_limit: DEFAULT_CACHE_LIMIT,
            backoff: DEFAULT_BACKOFF,
            filter: DEFAULT_FILTER.to_owned(),
        }
    }
}
