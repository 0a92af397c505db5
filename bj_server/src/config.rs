//! Server configuration loaded from `config.yaml`.
//!
//! Environment variables referenced as `${VAR}` in the file are expanded
//! before parsing (a `.env` file is honored first), so secrets like the
//! OAuth client id stay out of the config file itself.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 42069;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("unable to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub git_client_id: String,
    #[serde(default = "default_db_name")]
    pub sqlite_db_name: String,
    #[serde(default)]
    pub sqlite_schema_path: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            git_client_id: String::new(),
            sqlite_db_name: default_db_name(),
            sqlite_schema_path: None,
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default = "default_action_timeout")]
    pub table_action_timeout_seconds: u64,
    #[serde(default = "default_table_delete_timeout")]
    pub table_auto_delete_timeout_minutes: u64,
    #[serde(default = "default_bet_time")]
    pub bet_time_seconds: u64,
    #[serde(default = "default_stand_on_soft_17")]
    pub stand_on_soft_17: bool,
    #[serde(default = "default_deck_count")]
    pub deck_count: usize,
    #[serde(default = "default_cut_location")]
    pub cut_location: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            table_action_timeout_seconds: default_action_timeout(),
            table_auto_delete_timeout_minutes: default_table_delete_timeout(),
            bet_time_seconds: default_bet_time(),
            stand_on_soft_17: default_stand_on_soft_17(),
            deck_count: default_deck_count(),
            cut_location: default_cut_location(),
            log_level: default_log_level(),
        }
    }
}

fn default_db_name() -> String {
    "blackjack.db".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_action_timeout() -> u64 {
    30
}
fn default_table_delete_timeout() -> u64 {
    5
}
fn default_bet_time() -> u64 {
    30
}
fn default_stand_on_soft_17() -> bool {
    true
}
fn default_deck_count() -> usize {
    6
}
fn default_cut_location() -> usize {
    150
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load and validate the config file, expanding `${VAR}` references
    /// from the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env(raw);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.deck_count == 0 {
            return Err(ConfigError::Invalid {
                key: "deck_count".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.cut_location >= self.deck_count * 52 {
            return Err(ConfigError::Invalid {
                key: "cut_location".into(),
                reason: format!(
                    "must leave cards to draw from a {}-deck shoe",
                    self.deck_count
                ),
            });
        }
        if self.bet_time_seconds == 0 || self.table_action_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "bet_time_seconds".into(),
                reason: "timers must be non-zero".into(),
            });
        }
        Ok(())
    }
}

/// Expand `${VAR}` references from the environment; unset variables
/// expand to the empty string.
fn expand_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                if let Ok(value) = std::env::var(name) {
                    out.push_str(&value);
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
