use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::address::Address;
use crate::assembly::{FinalizeInputs, finalize};
use crate::auction::{
    AuctionState, BidParams, DeployAuctionParams, EndParams, StartParams, WithdrawParams,
    build_bid_tx, build_deploy_auction_tx, build_end_tx, build_start_tx, build_withdraw_tx,
    check_bid,
};
use crate::bet::{
    BetState, DeployBetParams, JoinParams, TimeoutParams, WinParams, build_deploy_bet_tx,
    build_join_tx, build_timeout_tx, build_win_tx, pick_winner,
};
use crate::chain::ChainBackend;
use crate::contract::CompiledValidator;
use crate::error::{Error, Result};
use crate::hashing::{KeyHash, TxId};
use crate::ledger::UnspentOutput;
use crate::locator::{Located, find_all_by_predicate, find_by_state};
use crate::network::Network;
use crate::params::BuildConfig;
use crate::plutus::{FromPlutusData, ToPlutusData};
use crate::signing::collect_signatures;
use crate::submit::{RetryPolicy, await_visible, submit};
use crate::tx::{TxDraft, UnsignedTransaction};
use crate::wallet::{TxSigner, Wallet};

/// Source of the current time in POSIX milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Result of a deploy: the locked output and the state it carries.
#[derive(Debug, Clone)]
pub struct DeployResult<S> {
    pub tx_id: TxId,
    pub state: S,
    pub output: UnspentOutput,
}

/// Result of an auction transition.
#[derive(Debug, Clone)]
pub struct AuctionActionResult {
    pub tx_id: TxId,
    pub previous_state: AuctionState,
    /// Live state left at the contract, `None` once the auction output is gone.
    pub new_state: Option<AuctionState>,
    /// Outputs of the transaction once the provider shows them.
    pub outputs: Vec<UnspentOutput>,
}

/// Result of a bet transition.
#[derive(Debug, Clone)]
pub struct BetActionResult {
    pub tx_id: TxId,
    pub previous_state: BetState,
    pub new_state: Option<BetState>,
    /// Set when the oracle settled the bet.
    pub winner: Option<KeyHash>,
    pub outputs: Vec<UnspentOutput>,
}

/// Entry point for both contract families.
///
/// Every flow re-locates the current contract output immediately before
/// building, so a stale state fails with `Error::NotFound` instead of
/// producing a transaction the validator would reject.
pub struct GavelbetSdk {
    chain: Arc<dyn ChainBackend>,
    network: Network,
    auction: CompiledValidator,
    bet: CompiledValidator,
    build_config: BuildConfig,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl GavelbetSdk {
    pub fn new(
        chain: Arc<dyn ChainBackend>,
        network: Network,
        auction: CompiledValidator,
        bet: CompiledValidator,
    ) -> Result<Self> {
        for v in [&auction, &bet] {
            if v.network() != network {
                return Err(Error::Address(format!(
                    "validator {} resolved for {}, sdk runs on {network}",
                    v.hash(),
                    v.network()
                )));
            }
        }
        Ok(Self {
            chain,
            network,
            auction,
            bet,
            build_config: BuildConfig::default(),
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_build_config(mut self, build_config: BuildConfig) -> Self {
        self.build_config = build_config;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn chain(&self) -> &dyn ChainBackend {
        self.chain.as_ref()
    }

    pub fn auction_validator(&self) -> &CompiledValidator {
        &self.auction
    }

    pub fn bet_validator(&self) -> &CompiledValidator {
        &self.bet
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Sleep on the runtime timer until the clock has passed `deadline` and
    /// the slot it falls in has started. Returns at once for a past deadline.
    pub async fn wait_for_deadline(&self, deadline: u64) {
        let slots = self.network.slot_config();
        let target = slots
            .slot_to_posix(slots.posix_to_slot_ceil(deadline))
            .max(deadline);
        loop {
            let now = self.now_ms();
            if now >= target {
                return;
            }
            log::debug!("waiting {} ms for deadline {deadline}", target - now);
            tokio::time::sleep(Duration::from_millis(target - now)).await;
        }
    }

    // ── Auction ──────────────────────────────────────────────────────────

    pub async fn deploy_auction(
        &self,
        wallet: &dyn Wallet,
        object: impl Into<Vec<u8>>,
        deadline: u64,
    ) -> Result<DeployResult<AuctionState>> {
        let seller = wallet.payment_key_hash().await?;
        let (draft, state) = build_deploy_auction_tx(
            &self.auction,
            &DeployAuctionParams {
                seller,
                object: object.into(),
                deadline,
                now_ms: self.now_ms(),
            },
        )?;
        log::info!("deploying auction for {}", state.object_label());
        self.deploy(wallet, &draft, &self.auction, state).await
    }

    pub async fn start_auction(
        &self,
        wallet: &dyn Wallet,
        state: &AuctionState,
        starting_bid: u64,
    ) -> Result<AuctionActionResult> {
        // A. Acting party and current output
        let caller = wallet.payment_key_hash().await?;
        let seller_address = wallet.change_address().await?;
        let current = find_by_state(self.chain(), self.auction.address(), state).await?;

        // B. Draft
        let draft = build_start_tx(
            &self.auction,
            &StartParams {
                current,
                state: state.clone(),
                caller,
                starting_bid,
                seller_address,
                now_ms: self.now_ms(),
            },
        )?;

        // C. Finalize, sign, submit
        let unsigned = self.finalize(wallet, &draft).await?;
        let (tx_id, outputs) = self.sign_submit_await(wallet, &unsigned, &[]).await?;

        Ok(AuctionActionResult {
            tx_id,
            previous_state: state.clone(),
            new_state: Some(state.started(starting_bid)),
            outputs,
        })
    }

    pub async fn place_bid(
        &self,
        wallet: &dyn Wallet,
        state: &AuctionState,
        amount: u64,
    ) -> Result<AuctionActionResult> {
        // A. Local checks before any network call
        check_bid(state, amount, self.now_ms())?;

        // B. Acting party and current output
        let bidder = wallet.payment_key_hash().await?;
        let current = find_by_state(self.chain(), self.auction.address(), state).await?;

        // C. Draft
        let draft = build_bid_tx(
            &self.auction,
            &BidParams {
                current,
                state: state.clone(),
                bidder,
                amount,
                now_ms: self.now_ms(),
            },
        )?;

        // D. Finalize, sign, submit
        let unsigned = self.finalize(wallet, &draft).await?;
        let (tx_id, outputs) = self.sign_submit_await(wallet, &unsigned, &[]).await?;

        let (next, _) = state.outbid_by(bidder, amount);
        Ok(AuctionActionResult {
            tx_id,
            previous_state: state.clone(),
            new_state: Some(next),
            outputs,
        })
    }

    /// Reclaim a superseded bid. `state` is the OUTBID state naming the
    /// wallet's key as bidder.
    pub async fn withdraw_bid(
        &self,
        wallet: &dyn Wallet,
        state: &AuctionState,
    ) -> Result<AuctionActionResult> {
        let caller = wallet.payment_key_hash().await?;
        let payout_address = wallet.change_address().await?;
        let current = find_by_state(self.chain(), self.auction.address(), state).await?;

        let draft = build_withdraw_tx(
            &self.auction,
            &WithdrawParams {
                current,
                state: state.clone(),
                caller,
                payout_address,
            },
        )?;

        let unsigned = self.finalize(wallet, &draft).await?;
        let (tx_id, outputs) = self.sign_submit_await(wallet, &unsigned, &[]).await?;
        Ok(AuctionActionResult {
            tx_id,
            previous_state: state.clone(),
            new_state: None,
            outputs,
        })
    }

    pub async fn end_auction(
        &self,
        wallet: &dyn Wallet,
        state: &AuctionState,
    ) -> Result<AuctionActionResult> {
        let caller = wallet.payment_key_hash().await?;
        let seller_address = wallet.change_address().await?;
        let current = find_by_state(self.chain(), self.auction.address(), state).await?;

        let draft = build_end_tx(
            &self.auction,
            &EndParams {
                current,
                state: state.clone(),
                caller,
                seller_address,
                now_ms: self.now_ms(),
            },
        )?;

        let unsigned = self.finalize(wallet, &draft).await?;
        let (tx_id, outputs) = self.sign_submit_await(wallet, &unsigned, &[]).await?;
        Ok(AuctionActionResult {
            tx_id,
            previous_state: state.clone(),
            new_state: None,
            outputs,
        })
    }

    /// Wait for the auction deadline, then end it.
    pub async fn end_auction_at_deadline(
        &self,
        wallet: &dyn Wallet,
        state: &AuctionState,
    ) -> Result<AuctionActionResult> {
        self.wait_for_deadline(state.deadline).await;
        self.end_auction(wallet, state).await
    }

    /// Auctions at the contract address whose state satisfies `predicate`.
    pub async fn list_auctions<P>(&self, predicate: P) -> Result<Vec<Located<AuctionState>>>
    where
        P: Fn(&AuctionState) -> bool,
    {
        find_all_by_predicate(self.chain(), self.auction.address(), predicate).await
    }

    // ── Bet ──────────────────────────────────────────────────────────────

    /// Open a bet with the wallet's key as player one.
    pub async fn deploy_bet(
        &self,
        wallet: &dyn Wallet,
        oracle: KeyHash,
        counterparty: KeyHash,
        wager: u64,
        deadline: u64,
    ) -> Result<DeployResult<BetState>> {
        let player1 = wallet.payment_key_hash().await?;
        let (draft, state) = build_deploy_bet_tx(
            &self.bet,
            &DeployBetParams {
                oracle,
                player1,
                player2: counterparty,
                wager,
                deadline,
                now_ms: self.now_ms(),
            },
        )?;
        log::info!("deploying bet of {wager} lovelace between {player1} and {counterparty}");
        self.deploy(wallet, &draft, &self.bet, state).await
    }

    /// Lock both stakes. The wallet funds the pot and signs for one player;
    /// `counterparty` signs for the other.
    pub async fn join_bet(
        &self,
        wallet: &dyn Wallet,
        counterparty: &dyn TxSigner,
        state: &BetState,
    ) -> Result<BetActionResult> {
        // A. Roles
        let me = wallet.payment_key_hash().await?;
        let other = if me == state.player1 {
            state.player2
        } else if me == state.player2 {
            state.player1
        } else {
            return Err(Error::Authorization(format!("{me} is not a player in this bet")));
        };
        if let Some(key) = counterparty.key_hash() {
            if key != other {
                return Err(Error::Authorization(format!(
                    "counterparty key {key} does not match player {other}"
                )));
            }
        }

        // B. Current output and draft
        let deposit_return = wallet.change_address().await?;
        let current = find_by_state(self.chain(), self.bet.address(), state).await?;
        let draft = build_join_tx(
            &self.bet,
            &JoinParams {
                current,
                state: state.clone(),
                deposit_return,
                now_ms: self.now_ms(),
            },
        )?;

        // C. Finalize, collect both signatures, submit
        let unsigned = self.finalize(wallet, &draft).await?;
        let (tx_id, outputs) = self
            .sign_submit_await(wallet, &unsigned, &[counterparty])
            .await?;

        Ok(BetActionResult {
            tx_id,
            previous_state: state.clone(),
            new_state: Some(state.joined()),
            winner: None,
            outputs,
        })
    }

    /// Oracle settlement. With `winner == None` a player is drawn at random.
    pub async fn settle_bet(
        &self,
        wallet: &dyn Wallet,
        oracle: &dyn TxSigner,
        state: &BetState,
        winner: Option<KeyHash>,
    ) -> Result<BetActionResult> {
        // A. Oracle identity and winner
        let caller = oracle
            .key_hash()
            .ok_or_else(|| Error::Signer("oracle signer does not expose its key hash".into()))?;
        let winner = match winner {
            Some(w) => w,
            None => pick_winner(state, &mut rand::thread_rng()),
        };
        let winner_address = Address::enterprise_key(self.network, winner);

        // B. Current output and draft
        let current = find_by_state(self.chain(), self.bet.address(), state).await?;
        let draft = build_win_tx(
            &self.bet,
            &WinParams {
                current,
                state: state.clone(),
                caller,
                winner,
                winner_address,
            },
        )?;

        // C. Finalize, wallet pays the fee, oracle co-signs
        let unsigned = self.finalize(wallet, &draft).await?;
        let (tx_id, outputs) = self.sign_submit_await(wallet, &unsigned, &[oracle]).await?;
        log::info!("bet settled in favour of {winner}");

        Ok(BetActionResult {
            tx_id,
            previous_state: state.clone(),
            new_state: None,
            winner: Some(winner),
            outputs,
        })
    }

    /// Refund both wagers after the deadline.
    pub async fn timeout_bet(
        &self,
        wallet: &dyn Wallet,
        counterparty: &dyn TxSigner,
        state: &BetState,
    ) -> Result<BetActionResult> {
        // A. Deadline first: a premature timeout must not reach the network
        let now_ms = self.now_ms();
        if now_ms < state.deadline {
            return Err(Error::Timing(format!(
                "bet runs until {}, now is {now_ms}",
                state.deadline
            )));
        }

        // B. Current output and draft
        let current = find_by_state(self.chain(), self.bet.address(), state).await?;
        let draft = build_timeout_tx(
            &self.bet,
            &TimeoutParams {
                current,
                state: state.clone(),
                player1_address: Address::enterprise_key(self.network, state.player1),
                player2_address: Address::enterprise_key(self.network, state.player2),
                now_ms,
            },
        )?;

        // C. Finalize and collect both player signatures
        let unsigned = self.finalize(wallet, &draft).await?;
        let (tx_id, outputs) = self
            .sign_submit_await(wallet, &unsigned, &[counterparty])
            .await?;

        Ok(BetActionResult {
            tx_id,
            previous_state: state.clone(),
            new_state: None,
            winner: None,
            outputs,
        })
    }

    /// Wait for the bet deadline, then refund both wagers.
    pub async fn timeout_bet_at_deadline(
        &self,
        wallet: &dyn Wallet,
        counterparty: &dyn TxSigner,
        state: &BetState,
    ) -> Result<BetActionResult> {
        self.wait_for_deadline(state.deadline).await;
        self.timeout_bet(wallet, counterparty, state).await
    }

    pub async fn list_bets<P>(&self, predicate: P) -> Result<Vec<Located<BetState>>>
    where
        P: Fn(&BetState) -> bool,
    {
        find_all_by_predicate(self.chain(), self.bet.address(), predicate).await
    }

    // ── Shared steps ─────────────────────────────────────────────────────

    async fn deploy<S>(
        &self,
        wallet: &dyn Wallet,
        draft: &TxDraft,
        validator: &CompiledValidator,
        state: S,
    ) -> Result<DeployResult<S>>
    where
        S: ToPlutusData + FromPlutusData + PartialEq,
    {
        let unsigned = self.finalize(wallet, draft).await?;
        let (tx_id, outputs) = self.sign_submit_await(wallet, &unsigned, &[]).await?;
        let expected = state.to_plutus_data().hash()?;
        let output = outputs
            .into_iter()
            .find(|u| u.output.address == *validator.address() && u.datum_hash() == Some(expected))
            .ok_or_else(|| Error::NotFound(format!("locked output of {tx_id}")))?;
        Ok(DeployResult {
            tx_id,
            state,
            output,
        })
    }

    /// Balance a draft against the wallet with fresh protocol parameters.
    async fn finalize(&self, wallet: &dyn Wallet, draft: &TxDraft) -> Result<UnsignedTransaction> {
        let protocol_params = self.chain.protocol_params().await?;
        let wallet_utxos = wallet.get_spendable_outputs().await?;
        let change_address = wallet.change_address().await?;
        let unsigned = finalize(
            draft,
            &FinalizeInputs {
                wallet_utxos: &wallet_utxos,
                change_address: &change_address,
                protocol_params: &protocol_params,
                build_config: &self.build_config,
                network: self.network,
                now_ms: self.now_ms(),
            },
        )?;
        log::debug!(
            "built {} ({} bytes, fee {})",
            unsigned.tx_id(),
            unsigned.fee().size_bytes,
            unsigned.fee().total
        );
        Ok(unsigned)
    }

    /// Wallet signs first, then every co-signer in order.
    async fn sign_submit_await(
        &self,
        wallet: &dyn Wallet,
        unsigned: &UnsignedTransaction,
        co_signers: &[&dyn TxSigner],
    ) -> Result<(TxId, Vec<UnspentOutput>)> {
        let mut signers: Vec<&dyn TxSigner> = Vec::with_capacity(co_signers.len() + 1);
        signers.push(wallet.as_signer());
        signers.extend_from_slice(co_signers);

        let signed = collect_signatures(unsigned, &signers).await?;
        let tx_id = submit(wallet, &signed).await?;
        let outputs = await_visible(self.chain(), &tx_id, &self.retry).await?;
        Ok((tx_id, outputs))
    }
}
