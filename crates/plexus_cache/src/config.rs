//! Cache configuration, loaded from a RON file.

use crate::{CacheCleaner, CleanerError, ProcessorCache};
use plexus_core::Processor;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Configuration shared by every processor cache and the cleaner.
///
/// Missing fields take their default values. Durations are written in
/// human-readable form, e.g. `"24h"` or `"2days 4h"`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// The shared cache root beneath which each processor has a directory.
    pub root: PathBuf,
    /// Whether processors should cache at all.
    pub enabled: bool,
    /// The size the cleaner limits the cache to, in megabytes.
    pub max_size_mb: u64,
    /// How long an entry that was never restored survives cleanup.
    #[serde(with = "duration")]
    pub unused_grace: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path:?}: {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            root: std::env::temp_dir().join("plexus").join("cache"),
            enabled: true,
            max_size_mb: 1024,
            unused_grace: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CacheConfig {
    /// Load the config at `path`, or the default config if there is no file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => {
                let config = Self::from_ron_str(&s)?;
                log::debug!("loaded cache config from {path:?}");
                Ok(config)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("no cache config at {path:?}, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                err,
            }),
        }
    }

    pub fn from_ron_str(s: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(s)?)
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default();
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Write the config to `path`, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |err| ConfigError::Io {
            path: path.to_path_buf(),
            err,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.to_ron_string()?).map_err(io_err)
    }

    /// A cache for the processor beneath the configured root, or `None` if
    /// caching is disabled.
    pub fn cache_for<P>(&self, processor: &P) -> Option<ProcessorCache>
    where
        P: ?Sized + Processor,
    {
        self.enabled.then(|| ProcessorCache::new(&self.root, processor))
    }

    /// A cleaner over the configured root using the configured grace period.
    pub fn cleaner(&self) -> Result<CacheCleaner, CleanerError> {
        CacheCleaner::initialize(&self.root).map(|c| c.with_grace(self.unused_grace))
    }
}

mod duration {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.collect_str(&humantime::format_duration(*d))
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        humantime::parse_duration(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config = CacheConfig::from_ron_str(r#"(max_size_mb: 16, unused_grace: "2h")"#).unwrap();
        assert_eq!(config.max_size_mb, 16);
        assert_eq!(config.unused_grace, Duration::from_secs(2 * 60 * 60));
        assert!(config.enabled);
        assert_eq!(config.root, CacheConfig::default().root);
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("conf").join("cache.ron");
        let config = CacheConfig {
            root: tmp.path().join("cache"),
            enabled: false,
            max_size_mb: 3,
            unused_grace: Duration::from_secs(90),
        };
        config.save(&path).unwrap();
        assert_eq!(CacheConfig::load(&path).unwrap(), config);
        let missing = CacheConfig::load(tmp.path().join("missing.ron")).unwrap();
        assert_eq!(missing, CacheConfig::default());
    }
}
