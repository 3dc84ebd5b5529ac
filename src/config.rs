//! Startup configuration, read once from the environment.
//!
//! The sampler daemon is configured entirely through `HOSTPULSE_*` variables;
//! malformed values are fatal before the loop begins.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// One hour, for retention cutoffs.
pub const ONE_HOUR: Duration = Duration::from_secs(60 * 60);
/// One day, for retention cutoffs.
pub const ONE_DAY: Duration = Duration::from_secs(60 * 60 * 24);
/// One week, for retention cutoffs.
pub const ONE_WEEK: Duration = Duration::from_secs(60 * 60 * 24 * 7);

const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 2;
const DB_FILE_NAME: &str = "hostpulse.db";

/// Sampler daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,

    /// Nominal time between samples. The loop measures actual elapsed time
    /// for rate math; this is only the scheduling target.
    pub sample_interval: Duration,

    /// Base directory for persisted artifacts.
    pub data_dir: PathBuf,

    /// Automatic retention window. `None` disables the periodic purge; the
    /// dashboard can still purge with an explicit cutoff.
    pub retention: Option<Duration>,
}

impl Config {
    /// Load configuration from `HOSTPULSE_*` environment variables.
    ///
    /// Creates the data directory if it does not exist. Returns a
    /// [`Error::Config`] for any malformed value.
    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(
            env::var("HOSTPULSE_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string()),
        );
        create_data_dir(&data_dir)?;

        let db_path = match env::var("HOSTPULSE_DB_URL") {
            Ok(url) => parse_db_url(&url)?,
            Err(_) => data_dir.join(DB_FILE_NAME),
        };

        let sample_interval = match env::var("HOSTPULSE_SAMPLE_INTERVAL") {
            Ok(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    Error::config(format!("HOSTPULSE_SAMPLE_INTERVAL must be an integer number of seconds, got {raw:?}"))
                })?;
                if secs == 0 {
                    return Err(Error::config("HOSTPULSE_SAMPLE_INTERVAL must be at least 1 second"));
                }
                Duration::from_secs(secs)
            },
            Err(_) => Duration::from_secs(DEFAULT_SAMPLE_INTERVAL_SECS),
        };

        let retention = match env::var("HOSTPULSE_RETENTION_HOURS") {
            Ok(raw) => {
                let hours: u64 = raw.parse().map_err(|_| {
                    Error::config(format!("HOSTPULSE_RETENTION_HOURS must be an integer, got {raw:?}"))
                })?;
                (hours > 0).then(|| Duration::from_secs(hours * 3600))
            },
            Err(_) => None,
        };

        Ok(Config { db_path, sample_interval, data_dir, retention })
    }

    /// Human-readable summary of the store target, for startup logging.
    pub fn db_summary(&self) -> String {
        format!("sqlite://{}", self.db_path.display())
    }
}

/// Create the data directory if it does not exist.
///
/// An unusable data directory is a configuration fault, not a store fault:
/// the loop has not started yet.
pub(crate) fn create_data_dir(data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir).map_err(|e| {
        Error::config(format!("cannot create data directory {}: {e}", data_dir.display()))
    })
}

/// Parse a database URL into a filesystem path.
///
/// Accepts `sqlite:///abs/path`, `sqlite://rel/path`, `sqlite:path`, or a
/// bare path. Any other scheme is rejected.
pub(crate) fn parse_db_url(url: &str) -> Result<PathBuf> {
    if let Some(rest) = url.strip_prefix("sqlite://") {
        if rest.is_empty() {
            return Err(Error::config("database URL has an empty path"));
        }
        return Ok(PathBuf::from(rest));
    }
    if let Some(rest) = url.strip_prefix("sqlite:") {
        if rest.is_empty() {
            return Err(Error::config("database URL has an empty path"));
        }
        return Ok(PathBuf::from(rest));
    }
    if let Some((scheme, _)) = url.split_once("://") {
        return Err(Error::config(format!(
            "unsupported database scheme {scheme:?}; only sqlite:// is supported"
        )));
    }
    if url.is_empty() {
        return Err(Error::config("database URL is empty"));
    }
    Ok(Path::new(url).to_path_buf())
}
