//! Configuration management for blogroll
//!
//! Holds the backend location, endpoint paths and login persistence settings.
//! Stored as JSON in the platform config directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding `api.base_url`
pub const API_URL_ENV: &str = "BLOGROLL_API_URL";

/// Errors raised while reading or writing the config file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine config path")]
    NoConfigDir,

    #[error("Config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Paths of the auth endpoints, relative to the API base URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub refresh: String,
    pub current_user: String,
    pub logout: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "api/user/login/".to_string(),
            refresh: "api/user/token/refresh/".to_string(),
            current_user: "api/user/me/".to_string(),
            logout: "api/user/logout/".to_string(),
        }
    }
}

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the blogging backend
    pub base_url: String,
    pub endpoints: Endpoints,
    /// Name of the HTTP-only cookie carrying the refresh credential
    pub refresh_cookie_name: String,
    /// Name of the cookie the backend mirrors its CSRF token into
    pub csrf_cookie_name: String,
    /// Per-request timeout; `None` waits indefinitely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/".to_string(),
            endpoints: Endpoints::default(),
            refresh_cookie_name: "refresh_token".to_string(),
            csrf_cookie_name: "csrftoken".to_string(),
            request_timeout_secs: None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    /// Keep the refresh credential in the OS keychain between runs
    #[serde(default = "default_remember_login")]
    pub remember_login: bool,
    /// Keychain service name for the persisted credential
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
}

fn default_remember_login() -> bool {
    true
}

fn default_keyring_service() -> String {
    "blogroll".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            remember_login: default_remember_login(),
            keyring_service: default_keyring_service(),
        }
    }
}

impl AppConfig {
    /// Gets the config directory path (cross-platform)
    fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|p| PathBuf::from(p).join("blogroll"))
        }

        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|p| PathBuf::from(p).join("Library/Application Support/blogroll"))
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| std::env::var("HOME").ok().map(|p| PathBuf::from(p).join(".config")))
                .map(|p| p.join("blogroll"))
        }
    }

    /// Gets the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.json"))
    }

    /// Loads configuration from the default location
    ///
    /// A missing or unreadable file yields the defaults. The API URL
    /// environment override is applied either way.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                tracing::warn!("Ignoring config at {:?}: {}", path, e);
                Self::default()
            }),
            _ => Self::default(),
        };
        config.apply_env_overrides();
        config
    }

    /// Loads configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Saves configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Saves configuration to a specific file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Applies environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::debug!("Using API URL from {}", API_URL_ENV);
                self.api.base_url = url.trim().to_string();
            }
        }
    }
}
