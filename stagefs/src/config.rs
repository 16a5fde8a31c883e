use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagefs_core::AuthResult;
use thiserror::Error;

const CONFIG_DIR_NAME: &str = "stagefs";
const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_API_VERSION: &str = "v20.1";
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config directory is unavailable")]
    MissingConfigDir,
    #[error("domain name is not configured, run `stagefs login -d <domain>`")]
    MissingDomain,
}

/// Values persisted between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_result: Option<AuthResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout_secs: Option<u64>,
    /// job id -> message shown once the job completes
    #[serde(default)]
    pub active_jobs: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    settings: Settings,
}

impl ConfigStore {
    /// `$STAGEFS_CONFIG`, falling back to `<config_dir>/stagefs/config.json`.
    pub fn open_default() -> Result<Self, ConfigError> {
        let path = match std::env::var_os("STAGEFS_CONFIG") {
            Some(path) => PathBuf::from(path),
            None => dirs::config_dir()
                .ok_or(ConfigError::MissingConfigDir)?
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        };
        Self::open(path)
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Settings::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Settings::default(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        Ok(Self { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(&self.settings).map_err(|source| {
            ConfigError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }

    /// Deletes the file and forgets everything.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.settings = Settings::default();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ConfigError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn domain_name(&self) -> Option<String> {
        read_string_env("STAGEFS_DOMAIN").or_else(|| self.settings.domain_name.clone())
    }

    pub fn require_domain_name(&self) -> Result<String, ConfigError> {
        self.domain_name().ok_or(ConfigError::MissingDomain)
    }

    pub fn api_version(&self) -> String {
        read_string_env("STAGEFS_API_VERSION")
            .or_else(|| self.settings.api_version.clone())
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string())
    }

    pub fn username(&self) -> Option<String> {
        read_string_env("STAGEFS_USERNAME").or_else(|| self.settings.username.clone())
    }

    pub fn job_timeout(&self) -> Duration {
        let secs = self
            .settings
            .job_timeout_secs
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_JOB_TIMEOUT_SECS);
        Duration::from_secs(read_u64_env("STAGEFS_JOB_TIMEOUT_SECS", secs))
    }
}

fn read_string_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
