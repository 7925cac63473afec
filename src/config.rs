//! Runtime configuration: an optional TOML file overridden by environment
//! variables.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::ActingUser;
use crate::infra::client::{DEFAULT_BASE_URL, DEFAULT_TTL};

pub const DEFAULT_CONFIG_FILE: &str = "precios-admin.toml";
pub const CONFIG_PATH_VAR: &str = "PRECIOS_CONFIG";
pub const BASE_URL_VAR: &str = "PRECIOS_BASE_URL";
pub const USER_VAR: &str = "PRECIOS_USER";
pub const CACHE_TTL_VAR: &str = "PRECIOS_CACHE_TTL_SECS";

const DEFAULT_USER: &str = "admin";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{var} must be a whole number of seconds, got {value:?}")]
    InvalidTtl { var: &'static str, value: String },
    #[error("acting user must not be empty")]
    EmptyUser,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub user: String,
    pub cache_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user: DEFAULT_USER.to_string(),
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
        }
    }
}

impl AppConfig {
    /// Loads the file named by `PRECIOS_CONFIG` (or the default file name)
    /// and applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let config = Self::from_file_or_default(&path)?;
        config.with_overrides(|key| env::var(key).ok())
    }

    /// A missing file yields the defaults; an unreadable or malformed one
    /// is an error.
    pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(?path, "config file not found; using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(?path, "loaded configuration");
        Ok(config)
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(BASE_URL_VAR) {
            self.base_url = base_url;
        }
        if let Some(user) = lookup(USER_VAR) {
            self.user = user;
        }
        if let Some(raw) = lookup(CACHE_TTL_VAR) {
            self.cache_ttl_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidTtl {
                var: CACHE_TTL_VAR,
                value: raw.clone(),
            })?;
        }
        Ok(self)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn acting_user(&self) -> Result<ActingUser, ConfigError> {
        let user = self.user.trim();
        if user.is_empty() {
            return Err(ConfigError::EmptyUser);
        }
        Ok(ActingUser::new(user))
    }
}
