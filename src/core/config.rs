//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DlgError, Result};
use crate::core::paths;

/// Smallest mapped region we accept; one page.
pub const MIN_MAPPED_REGION_BYTES: u64 = 4096;

/// Full recorder configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub session: SessionConfig,
    pub queue: QueueConfig,
}

/// Where and how log files are written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Log storage root. Every file in here is owned by the recorder.
    pub directory: PathBuf,
    /// Skip the mapped backend entirely and write plain files only.
    pub backup_forced: bool,
    /// Size of each mapped region; the mapped file grows by this much when full.
    pub mapped_region_bytes: u64,
    /// Persist a mapped init failure so later processes go straight to plain.
    pub remember_mapped_failure: bool,
}

/// Encryption of persisted lines.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Key material for encrypted lines. Empty disables encryption.
    pub cipher_key: String,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field(
                "cipher_key",
                &if self.cipher_key.is_empty() {
                    "<unset>"
                } else {
                    "<redacted>"
                },
            )
            .finish()
    }
}

/// Identity fed into the session header line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Initial user info; replaced at runtime by `LogRecorder::refresh_user`.
    pub user_info: String,
    pub device_id: String,
}

/// Recording queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    /// Bounded capacity of the recording queue. Overflowing tasks are dropped.
    pub capacity: usize,
    /// Enqueue backend initialization as soon as the recorder starts.
    pub eager_init: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: paths::default_log_dir(),
            backup_forced: false,
            mapped_region_bytes: 256 * 1024,
            remember_mapped_failure: false,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            eager_init: false,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        paths::default_config_file()
    }

    /// Config rooted at `directory` with every other knob at its default.
    #[must_use]
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::default();
        cfg.storage.directory = directory.into();
        cfg
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DlgError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(DlgError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Render the effective config as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DlgError::Serialization {
            context: "toml",
            details: e.to_string(),
        })
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // storage
        if let Some(raw) = lookup("DLOG_STORAGE_DIRECTORY") {
            self.storage.directory = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("DLOG_STORAGE_BACKUP_FORCED") {
            self.storage.backup_forced = parse_env("DLOG_STORAGE_BACKUP_FORCED", &raw)?;
        }
        if let Some(raw) = lookup("DLOG_STORAGE_MAPPED_REGION_BYTES") {
            self.storage.mapped_region_bytes =
                parse_env("DLOG_STORAGE_MAPPED_REGION_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("DLOG_STORAGE_REMEMBER_MAPPED_FAILURE") {
            self.storage.remember_mapped_failure =
                parse_env("DLOG_STORAGE_REMEMBER_MAPPED_FAILURE", &raw)?;
        }

        // security
        if let Some(raw) = lookup("DLOG_SECURITY_CIPHER_KEY") {
            self.security.cipher_key = raw;
        }

        // session
        if let Some(raw) = lookup("DLOG_SESSION_USER_INFO") {
            self.session.user_info = raw;
        }
        if let Some(raw) = lookup("DLOG_SESSION_DEVICE_ID") {
            self.session.device_id = raw;
        }

        // queue
        if let Some(raw) = lookup("DLOG_QUEUE_CAPACITY") {
            self.queue.capacity = parse_env("DLOG_QUEUE_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("DLOG_QUEUE_EAGER_INIT") {
            self.queue.eager_init = parse_env("DLOG_QUEUE_EAGER_INIT", &raw)?;
        }

        Ok(())
    }

    /// Make the storage directory absolute.
    pub fn normalize_paths(&mut self) {
        self.storage.directory = paths::absolutize(&self.storage.directory);
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        if self.storage.directory.as_os_str().is_empty() {
            return Err(DlgError::InvalidConfig {
                details: "storage.directory must not be empty".to_string(),
            });
        }

        if self.storage.mapped_region_bytes < MIN_MAPPED_REGION_BYTES {
            return Err(DlgError::InvalidConfig {
                details: format!(
                    "storage.mapped_region_bytes ({}) must be >= {MIN_MAPPED_REGION_BYTES}",
                    self.storage.mapped_region_bytes,
                ),
            });
        }

        if self.queue.capacity == 0 {
            return Err(DlgError::InvalidConfig {
                details: "queue.capacity must be > 0".to_string(),
            });
        }

        // The header joins session fields with ',' after escaping, so any
        // content is representable; only control characters are refused.
        if self
            .session
            .device_id
            .chars()
            .any(|c| c.is_control())
        {
            return Err(DlgError::InvalidConfig {
                details: "session.device_id must not contain control characters".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| DlgError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
