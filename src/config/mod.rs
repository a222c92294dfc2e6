//! YAML configuration stored in `~/.zensession/zensession.conf`.
//!
//! Every field has a default, so an older or hand-trimmed file still loads.

use crate::errors::{AppError, AppResult};
use crate::models::actor::{Actor, AuthState};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Overrides the configuration directory (tests, portable installs).
pub const HOME_ENV: &str = "ZENSESSION_HOME";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_local_store")]
    pub local_store: String,
    #[serde(default = "default_preferences")]
    pub preferences: String,
    /// Identity reported by the authentication provider; unset means
    /// signed out.
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub actor_handle: Option<String>,
    /// Universe mode: show every actor's records.
    #[serde(default)]
    pub show_all: bool,
    #[serde(default = "default_mutation_timeout")]
    pub mutation_timeout_secs: u64,
    #[serde(default = "default_change_poll")]
    pub change_poll_millis: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_database() -> String {
    Config::config_dir()
        .join("zensession.sqlite")
        .to_string_lossy()
        .to_string()
}

fn default_local_store() -> String {
    Config::config_dir()
        .join("zensession-local.json")
        .to_string_lossy()
        .to_string()
}

fn default_preferences() -> String {
    Config::config_dir()
        .join("preferences.json")
        .to_string_lossy()
        .to_string()
}

fn default_mutation_timeout() -> u64 {
    10
}

fn default_change_poll() -> u64 {
    1000
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            database: default_database(),
            local_store: default_local_store(),
            preferences: default_preferences(),
            actor_id: None,
            actor_handle: None,
            show_all: false,
            mutation_timeout_secs: default_mutation_timeout(),
            change_poll_millis: default_change_poll(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// `$ZENSESSION_HOME`, or `~/.zensession`.
    pub fn config_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(dir);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".zensession")
    }

    pub fn config_file() -> PathBuf {
        Self::config_dir().join("zensession.conf")
    }

    /// Load the configuration file, or defaults when there is none.
    pub fn load() -> AppResult<Self> {
        Self::load_from(&Self::config_file())
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Create the configuration directory and file. A relative `custom_db`
    /// is placed inside the configuration directory. With `is_test` nothing
    /// is written except the directory.
    pub fn init_all(custom_db: Option<&str>, is_test: bool) -> AppResult<Self> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;

        let mut cfg = Self::load()?;
        if let Some(name) = custom_db {
            let p = Path::new(name);
            let path = if p.is_absolute() {
                p.to_path_buf()
            } else {
                dir.join(p)
            };
            cfg.database = path.to_string_lossy().to_string();
        }

        if !is_test {
            cfg.save_to(&Self::config_file())?;
        }
        Ok(cfg)
    }

    pub fn auth_state(&self) -> AuthState {
        match self.actor_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => {
                let handle = self
                    .actor_handle
                    .clone()
                    .filter(|h| !h.trim().is_empty())
                    .unwrap_or_else(|| id.to_string());
                AuthState::SignedIn(Actor::new(id, handle))
            }
            _ => AuthState::SignedOut,
        }
    }
}
