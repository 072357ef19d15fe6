use std::path::PathBuf;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;

const RENTAL_WAL: &str = "rental.wal";
const NOTIFICATION_WAL: &str = "notifications.wal";

/// Process settings, read from `RENTAL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Prometheus listener port; no exporter when unset.
    pub metrics_port: Option<u16>,
    /// Logs holding at least this many records are compacted on open. 0 disables.
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            metrics_port: None,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("RENTAL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let metrics_port = lookup("RENTAL_METRICS_PORT").and_then(|s| s.parse().ok());
        let compact_threshold = lookup("RENTAL_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_COMPACT_THRESHOLD);
        Self {
            data_dir,
            metrics_port,
            compact_threshold,
        }
    }

    pub fn rental_wal_path(&self) -> PathBuf {
        self.data_dir.join(RENTAL_WAL)
    }

    pub fn notification_wal_path(&self) -> PathBuf {
        self.data_dir.join(NOTIFICATION_WAL)
    }
}
