use std::fs;
use std::path::{Path, PathBuf};

use gavelbet_sdk::{BuildConfig, Network, RetryPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::secrets::EncryptedKeyStore;

pub const CONFIG_FILE: &str = "gavelbet.json";

pub const ENV_PROJECT_ID: &str = "GAVELBET_BLOCKFROST_PROJECT_ID";
pub const ENV_NETWORK: &str = "GAVELBET_NETWORK";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Application settings, read from `gavelbet.json` in the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub network: Network,
    #[serde(default)]
    pub blockfrost_project_id: String,
    /// Overrides the public Blockfrost endpoint for `network`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockfrost_url: Option<String>,
    /// Path to the `plutus.json` blueprint holding the auction validator.
    pub auction_blueprint: PathBuf,
    #[serde(default = "default_auction_title")]
    pub auction_title: String,
    pub bet_blueprint: PathBuf,
    #[serde(default = "default_bet_title")]
    pub bet_title: String,
    /// Directory holding the encrypted key files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub build: BuildConfig,
}

fn default_auction_title() -> String {
    "auction.auction".to_string()
}

fn default_bet_title() -> String {
    "bet.bet".to_string()
}

impl AppConfig {
    /// Read, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let mut config: AppConfig = serde_json::from_str(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;

        // Blueprint paths are relative to the config file.
        if let Some(base) = path.parent() {
            config.auction_blueprint = base.join(&config.auction_blueprint);
            config.bet_blueprint = base.join(&config.bet_blueprint);
        }
        config.validate()?;
        tracing::debug!(network = %config.network, path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Environment wins over the file for the provider key and the network.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(id) = lookup(ENV_PROJECT_ID) {
            self.blockfrost_project_id = id;
        }
        if let Some(network) = lookup(ENV_NETWORK) {
            self.network = network.parse().map_err(|reason| ConfigError::Invalid {
                field: "network",
                reason,
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = self.blockfrost_project_id.trim();
        if id.is_empty() {
            return Err(ConfigError::Missing("blockfrostProjectId"));
        }
        // Blockfrost ids carry their network as prefix.
        let expected = self.network.as_str();
        if !id.starts_with(expected) {
            return Err(ConfigError::Invalid {
                field: "blockfrostProjectId",
                reason: format!("project id is not for {expected}"),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.build.validity_window.is_zero() {
            return Err(ConfigError::Invalid {
                field: "build.validity_window",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn blockfrost_url(&self) -> &str {
        self.blockfrost_url
            .as_deref()
            .unwrap_or_else(|| self.network.blockfrost_url())
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Encrypted key store under the data directory, when one is configured.
    pub fn key_store(&self) -> Option<EncryptedKeyStore> {
        self.data_dir().map(EncryptedKeyStore::new)
    }
}
