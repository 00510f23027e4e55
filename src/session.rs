use std::fs;
use std::sync::Arc;

use gavelbet_sdk::{
    BlockfrostBackend, ChainBackend, CompiledValidator, GavelbetSdk, KeySigner, KeyWallet,
    Wallet,
};
use tokio::sync::{Mutex, MutexGuard};

use crate::config::AppConfig;
use crate::secrets::SecretProvider;
use crate::workflow::{AuctionWorkflow, BetWorkflow, WorkflowStore};
use crate::{AppError, WALLET_KEY};

/// Everything a command needs: the SDK bound to one network, the acting
/// wallet, the key source for co-signers and the workflow records.
pub struct Session {
    sdk: GavelbetSdk,
    wallet: Arc<dyn Wallet>,
    secrets: Arc<dyn SecretProvider>,
    workflows: Mutex<WorkflowStore>,
}

impl Session {
    pub fn new(
        sdk: GavelbetSdk,
        wallet: Arc<dyn Wallet>,
        secrets: Arc<dyn SecretProvider>,
        workflows: WorkflowStore,
    ) -> Self {
        Self {
            sdk,
            wallet,
            secrets,
            workflows: Mutex::new(workflows),
        }
    }

    /// Wire a session against Blockfrost from a loaded config. The acting
    /// wallet is the key the provider returns for `"wallet"`; its workflow
    /// records are recovered from the contract addresses.
    pub async fn open(
        config: &AppConfig,
        secrets: Arc<dyn SecretProvider>,
    ) -> Result<Self, AppError> {
        let network = config.network;
        let chain: Arc<dyn ChainBackend> = Arc::new(BlockfrostBackend::with_base_url(
            config.blockfrost_url(),
            &config.blockfrost_project_id,
        ));

        let auction = CompiledValidator::from_blueprint(
            &fs::read_to_string(&config.auction_blueprint)?,
            &config.auction_title,
            network,
        )?;
        let bet = CompiledValidator::from_blueprint(
            &fs::read_to_string(&config.bet_blueprint)?,
            &config.bet_title,
            network,
        )?;
        tracing::info!(
            network = %network,
            auction = %auction.hash(),
            bet = %bet.hash(),
            "validators loaded"
        );

        let sdk = GavelbetSdk::new(chain.clone(), network, auction, bet)?
            .with_build_config(config.build.clone())
            .with_retry_policy(config.retry.clone());

        let wallet = KeyWallet::new(secrets.signing_key(WALLET_KEY)?, network, chain);
        tracing::info!(address = %wallet.address(), "wallet ready");

        let owner = wallet.signer().public_key_hash();
        let workflows = WorkflowStore::rebuild(&sdk, &owner).await?;

        Ok(Self::new(sdk, Arc::new(wallet), secrets, workflows))
    }

    pub fn sdk(&self) -> &GavelbetSdk {
        &self.sdk
    }

    pub fn wallet(&self) -> &dyn Wallet {
        self.wallet.as_ref()
    }

    /// A co-signer's key, looked up by name on each use.
    pub fn signer(&self, name: &str) -> Result<KeySigner, AppError> {
        Ok(self.secrets.signing_key(name)?)
    }

    pub async fn workflows(&self) -> MutexGuard<'_, WorkflowStore> {
        self.workflows.lock().await
    }

    /// Copy of an unfinished auction workflow. The lock is released before
    /// the caller goes to the network.
    pub async fn open_auction(&self, id: &str) -> Result<AuctionWorkflow, AppError> {
        let store = self.workflows.lock().await;
        let workflow = store
            .auction(id)
            .ok_or_else(|| AppError::UnknownWorkflow(id.to_string()))?;
        if workflow.finished {
            return Err(AppError::WorkflowFinished(id.to_string()));
        }
        Ok(workflow.clone())
    }

    pub async fn open_bet(&self, id: &str) -> Result<BetWorkflow, AppError> {
        let store = self.workflows.lock().await;
        let workflow = store
            .bet(id)
            .ok_or_else(|| AppError::UnknownWorkflow(id.to_string()))?;
        if workflow.finished {
            return Err(AppError::WorkflowFinished(id.to_string()));
        }
        Ok(workflow.clone())
    }
}
