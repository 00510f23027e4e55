pub mod commands;
pub mod config;
pub mod logging;
pub mod secrets;
pub mod session;
pub mod workflow;

use thiserror::Error;

pub use config::{AppConfig, ConfigError};
pub use secrets::{
    ChainedSecretProvider, EncryptedKeyStore, EnvSecretProvider, FileSecretProvider,
    SecretError, SecretProvider,
};
pub use session::Session;
pub use workflow::{AuctionWorkflow, BetWorkflow, WorkflowStore};

/// Key names the secret provider is asked for.
pub const WALLET_KEY: &str = "wallet";
pub const ORACLE_KEY: &str = "oracle";
pub const COUNTERPARTY_KEY: &str = "counterparty";

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Sdk(#[from] gavelbet_sdk::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown workflow {0}")]
    UnknownWorkflow(String),

    #[error("workflow {0} is already finished")]
    WorkflowFinished(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}
