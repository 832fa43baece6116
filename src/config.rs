use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

const PREFIX: &str = "BOXOFFICE_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub lock_timeout: Duration,
    /// `None` keeps cache entries until the next write.
    pub cache_ttl: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_millis(5000),
            lock_timeout: Duration::from_millis(2000),
            cache_ttl: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Keys are unprefixed (`DATA_DIR`, ...).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(&format!("{PREFIX}{key}")).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            metrics_port: get("METRICS_PORT").and_then(|v| parse_or_warn("METRICS_PORT", &v)),
            compact_threshold: get("COMPACT_THRESHOLD")
                .and_then(|v| parse_or_warn("COMPACT_THRESHOLD", &v))
                .unwrap_or(defaults.compact_threshold),
            compact_interval: get("COMPACT_INTERVAL_MS")
                .and_then(|v| parse_or_warn("COMPACT_INTERVAL_MS", &v))
                .map(Duration::from_millis)
                .unwrap_or(defaults.compact_interval),
            lock_timeout: get("LOCK_TIMEOUT_MS")
                .and_then(|v| parse_or_warn("LOCK_TIMEOUT_MS", &v))
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            cache_ttl: get("CACHE_TTL_MS")
                .and_then(|v| parse_or_warn("CACHE_TTL_MS", &v))
                .map(Duration::from_millis),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("boxoffice.wal")
    }
}

fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {PREFIX}{key}={raw:?}: not a valid value, using default");
            None
        }
    }
}
