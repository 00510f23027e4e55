//! In-memory ledger and fixtures for tests.
//!
//! `MockLedger` plays both the query provider and the node: submitted
//! transactions are checked for existing inputs, signatures, validity
//! interval, value conservation and collateral before their outputs are
//! added to the UTxO set.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::address::{Address, Credential};
use crate::chain::ChainBackend;
use crate::contract::{CompiledValidator, script_hash};
use crate::error::{Error, Result};
use crate::hashing::{KeyHash, TxId, blake2b_256};
use crate::ledger::{OutputRef, TxOutput, UnspentOutput, Value};
use crate::network::Network;
use crate::params::{ExUnits, ProtocolParams, Rational};
use crate::plutus::ToPlutusData;
use crate::sdk::Clock;
use crate::signing::verified_key_hashes;
use crate::tx::Transaction;
use crate::tx::wire::output_size;

pub const TEST_NOW_MS: u64 = 1_700_000_000_000;

pub fn test_protocol_params() -> ProtocolParams {
    ProtocolParams {
        min_fee_a: 44,
        min_fee_b: 155_381,
        coins_per_utxo_byte: 4_310,
        price_mem: Rational {
            numerator: 577,
            denominator: 10_000,
        },
        price_steps: Rational {
            numerator: 721,
            denominator: 10_000_000,
        },
        collateral_percent: 150,
        max_collateral_inputs: 3,
        max_tx_size: 16_384,
        max_tx_ex_units: ExUnits::new(14_000_000, 10_000_000_000),
        plutus_v3_cost_model: vec![100_788, 420, 1, 1, 1000, 173, 0, 1],
    }
}

/// Preview enterprise address of the key hash `[b; 28]`.
pub fn wallet_address(b: u8) -> Address {
    Address::enterprise_key(Network::Preview, KeyHash([b; 28]))
}

pub fn auction_validator() -> CompiledValidator {
    CompiledValidator::resolve("46010100002499", &[], Network::Preview)
        .expect("fixture script resolves")
}

pub fn bet_validator() -> CompiledValidator {
    CompiledValidator::resolve("4701010000222499", &[], Network::Preview)
        .expect("fixture script resolves")
}

/// Output at the validator address carrying `datum` inline.
pub fn locked_output(
    validator: &CompiledValidator,
    tx: u8,
    coin: u64,
    datum: &impl ToPlutusData,
) -> UnspentOutput {
    UnspentOutput::new(
        OutputRef::new(TxId([tx; 32]), 0),
        TxOutput::with_inline_datum(
            validator.address().clone(),
            Value::lovelace(coin),
            &datum.to_plutus_data(),
        )
        .expect("fixture datum encodes"),
    )
}

#[derive(Default)]
struct LedgerState {
    utxos: BTreeMap<OutputRef, TxOutput>,
    /// Outputs created per transaction and the number of by-tx queries
    /// still to answer with not-found.
    txs: HashMap<TxId, (Vec<OutputRef>, u32)>,
    visibility_lag: u32,
    query_failure: Option<String>,
    funded: u64,
}

/// Shared in-memory ledger implementing [`ChainBackend`] and [`Clock`].
pub struct MockLedger {
    network: Network,
    params: ProtocolParams,
    now_ms: AtomicU64,
    /// Set once the clock follows runtime time; `now_ms` is then the base.
    anchor: StdMutex<Option<tokio::time::Instant>>,
    by_tx_queries: AtomicU64,
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            params: test_protocol_params(),
            now_ms: AtomicU64::new(TEST_NOW_MS),
            anchor: StdMutex::new(None),
            by_tx_queries: AtomicU64::new(0),
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Credit `address` with a fresh output.
    pub async fn fund(&self, address: &Address, value: Value) -> OutputRef {
        let mut state = self.state.lock().await;
        state.funded += 1;
        let mut seed = b"fund".to_vec();
        seed.extend_from_slice(&state.funded.to_be_bytes());
        let out_ref = OutputRef::new(TxId(blake2b_256(&seed)), 0);
        state
            .utxos
            .insert(out_ref, TxOutput::new(address.clone(), value));
        out_ref
    }

    pub async fn insert(&self, utxo: UnspentOutput) {
        self.state.lock().await.utxos.insert(utxo.out_ref, utxo.output);
    }

    pub async fn utxos_at(&self, address: &Address) -> Vec<UnspentOutput> {
        let state = self.state.lock().await;
        at_address(&state, address)
    }

    pub async fn balance(&self, address: &Address) -> u64 {
        self.utxos_at(address).await.iter().map(|u| u.coin()).sum()
    }

    pub fn set_now_ms(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
        if let Ok(mut anchor) = self.anchor.lock() {
            if anchor.is_some() {
                *anchor = Some(tokio::time::Instant::now());
            }
        }
    }

    /// From now on the clock advances with tokio time, so sleeping on a
    /// paused runtime moves the ledger forward too.
    pub fn follow_runtime_clock(&self) {
        if let Ok(mut anchor) = self.anchor.lock() {
            *anchor = Some(tokio::time::Instant::now());
        }
    }

    fn runtime_elapsed_ms(&self) -> u64 {
        let anchor = match self.anchor.lock() {
            Ok(guard) => *guard,
            Err(_) => None,
        };
        anchor.map_or(0, |start| start.elapsed().as_millis() as u64)
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Number of by-tx queries that answer not-found after each submission.
    pub async fn set_visibility_lag(&self, queries: u32) {
        self.state.lock().await.visibility_lag = queries;
    }

    /// Make by-tx queries fail with a provider error.
    pub async fn set_query_failure(&self, message: Option<&str>) {
        self.state.lock().await.query_failure = message.map(str::to_string);
    }

    pub fn by_tx_queries(&self) -> u64 {
        self.by_tx_queries.load(Ordering::SeqCst)
    }

    fn validate(&self, state: &LedgerState, tx: &Transaction) -> Result<()> {
        let body = tx.body();
        let reject = |msg: String| Err(Error::Submission(msg));

        let mut spent = Vec::with_capacity(body.inputs.len());
        for input in &body.inputs {
            match state.utxos.get(input) {
                Some(out) => spent.push((input, out)),
                None => return reject(format!("input {input} is unknown or already spent")),
            }
        }

        let slot = self.network.slot_config().posix_to_slot(self.now_ms());
        if let Some(from) = body.validity_start {
            if slot < from {
                return reject(format!("not valid before slot {from}, current slot {slot}"));
            }
        }
        if let Some(ttl) = body.ttl {
            if slot >= ttl {
                return reject(format!("expired at slot {ttl}, current slot {slot}"));
            }
        }

        let signed = verified_key_hashes(tx).map_err(|e| Error::Submission(e.to_string()))?;
        let mut needed: HashSet<KeyHash> = body.required_signers.iter().copied().collect();
        for (_, out) in &spent {
            if let Some(key) = out.address.payment_key_hash() {
                needed.insert(key);
            }
        }
        for c in &body.collateral {
            if let Some(key) = state.utxos.get(c).and_then(|out| out.address.payment_key_hash()) {
                needed.insert(key);
            }
        }
        if let Some(missing) = needed.iter().find(|k| !signed.contains(k)) {
            return reject(format!("missing witness for {missing}"));
        }

        let redeemers = tx.witnesses.redeemers()?;
        let scripts: HashSet<_> = tx
            .witnesses
            .plutus_v3_scripts()?
            .iter()
            .map(|s| script_hash(s))
            .collect();
        for (index, (_, out)) in spent.iter().enumerate() {
            if let Some(Credential::Script(hash)) = out.address.payment_credential() {
                if !scripts.contains(&hash) {
                    return reject(format!("no script witness for {hash}"));
                }
                if !redeemers.iter().any(|r| r.index as usize == index) {
                    return reject(format!("no redeemer for input {index}"));
                }
            }
        }
        let mut ex_units = ExUnits::default();
        for r in &redeemers {
            ex_units = ex_units.checked_add(r.ex_units).ok_or(Error::ValueOverflow)?;
        }
        if !redeemers.is_empty() {
            if body.collateral.is_empty() {
                return reject("script transaction without collateral".into());
            }
            for c in &body.collateral {
                let Some(out) = state.utxos.get(c) else {
                    return reject(format!("collateral {c} is unknown"));
                };
                if out.address.is_script() || out.value.has_assets() {
                    return reject(format!("collateral {c} is not pure lovelace at a key address"));
                }
            }
        }

        let size = tx.to_bytes()?.len() as u64;
        let min_fee = self.params.min_fee(size, ex_units)?;
        if body.fee < min_fee {
            return reject(format!("fee {} below minimum {min_fee}", body.fee));
        }

        for out in &body.outputs {
            let required = self.params.min_utxo_lovelace(output_size(out)?);
            if out.value.coin < required {
                return reject(format!("output below minimum: {} < {required}", out.value.coin));
            }
        }

        let mut consumed = Value::default();
        for (_, out) in &spent {
            consumed = consumed.checked_add(&out.value)?;
        }
        let mut produced = Value::lovelace(body.fee);
        for out in &body.outputs {
            produced = produced.checked_add(&out.value)?;
        }
        if consumed != produced {
            return reject(format!(
                "value not conserved: consumed {} lovelace, produced {}",
                consumed.coin, produced.coin
            ));
        }
        Ok(())
    }
}

impl Clock for MockLedger {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst) + self.runtime_elapsed_ms()
    }
}

fn at_address(state: &LedgerState, address: &Address) -> Vec<UnspentOutput> {
    state
        .utxos
        .iter()
        .filter(|(_, out)| out.address == *address)
        .map(|(r, out)| UnspentOutput::new(*r, out.clone()))
        .collect()
}

#[async_trait]
impl ChainBackend for MockLedger {
    async fn fetch_outputs_at_address(&self, address: &Address) -> Result<Vec<UnspentOutput>> {
        let state = self.state.lock().await;
        Ok(at_address(&state, address))
    }

    async fn fetch_outputs_by_tx(&self, tx_id: &TxId) -> Result<Vec<UnspentOutput>> {
        self.by_tx_queries.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        if let Some(msg) = &state.query_failure {
            return Err(Error::Query(msg.clone()));
        }
        let Some((refs, lag)) = state.txs.get_mut(tx_id) else {
            return Err(Error::NotFound(format!("transaction {tx_id}")));
        };
        if *lag > 0 {
            *lag -= 1;
            return Err(Error::NotFound(format!("transaction {tx_id}")));
        }
        let refs = refs.clone();
        Ok(refs
            .into_iter()
            .filter_map(|r| state.utxos.get(&r).map(|out| UnspentOutput::new(r, out.clone())))
            .collect())
    }

    async fn submit_transaction(&self, tx_bytes: &[u8]) -> Result<TxId> {
        let tx = Transaction::from_bytes(tx_bytes).map_err(|e| Error::Submission(e.to_string()))?;
        let mut state = self.state.lock().await;
        self.validate(&state, &tx)?;

        let id = tx.id();
        for input in &tx.body().inputs {
            state.utxos.remove(input);
        }
        let mut created = Vec::with_capacity(tx.body().outputs.len());
        for (i, out) in tx.body().outputs.iter().enumerate() {
            let r = OutputRef::new(id, i as u32);
            state.utxos.insert(r, out.clone());
            created.push(r);
        }
        let lag = state.visibility_lag;
        state.txs.insert(id, (created, lag));
        Ok(id)
    }

    async fn protocol_params(&self) -> Result<ProtocolParams> {
        Ok(self.params.clone())
    }
}
