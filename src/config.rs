use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Cache configuration.
///
/// All fields have defaults, so a config file only needs to name the
/// settings it wants to change.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for the on-disk resource cache.
    pub cache_dir: PathBuf,

    /// The process memory budget in bytes.
    ///
    /// The in-memory cache is bounded by a quarter of this, with a 4 MiB
    /// floor.
    pub memory_budget: u64,

    /// Connect timeout for outgoing HTTP fetches.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Capacity of the disk persistence queue. Writes beyond it are
    /// dropped rather than blocking the caller.
    pub persist_queue_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("pixcache"),
            memory_budget: 256 * 1024 * 1024,
            connect_timeout: Duration::from_secs(15),
            persist_queue_size: 64,
        }
    }
}
