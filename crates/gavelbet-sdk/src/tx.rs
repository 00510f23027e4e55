//! Transaction drafts and the finalized, signable byte forms.

pub mod wire;

use crate::contract::CompiledValidator;
use crate::error::{Error, Result};
use crate::hashing::{KeyHash, ScriptHash, TxId};
use crate::ledger::{OutputDatum, TxOutput, UnspentOutput};
use crate::plutus::PlutusData;

pub use wire::{Redeemer, RedeemerTag, Transaction, TxBody, VKeyWitness, WitnessSet};

/// A script-locked output being spent, with everything the witness set needs.
#[derive(Debug, Clone)]
pub struct ScriptInput {
    pub utxo: UnspentOutput,
    pub redeemer: PlutusData,
    pub script_hash: ScriptHash,
    pub script_bytes: Vec<u8>,
    /// Present when the output only carries a datum hash.
    pub witness_datum: Option<PlutusData>,
}

/// The action-specific part of a transaction, before wallet inputs, collateral,
/// fee and change are added by [`crate::assembly::finalize`].
#[derive(Debug, Clone, Default)]
pub struct TxDraft {
    script_inputs: Vec<ScriptInput>,
    outputs: Vec<TxOutput>,
    required_signers: Vec<KeyHash>,
    valid_from_slot: Option<u64>,
    valid_until_slot: Option<u64>,
}

impl TxDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spend `utxo` through `validator` with `redeemer`. `datum` is the state the
    /// output was located by; it is attached as a witness only when the output
    /// references its datum by hash.
    pub fn spend_script(
        &mut self,
        utxo: &UnspentOutput,
        validator: &CompiledValidator,
        redeemer: PlutusData,
        datum: &PlutusData,
    ) -> Result<&mut Self> {
        if &utxo.output.address != validator.address() {
            return Err(Error::NotFound(format!(
                "output {} is not locked by validator {}",
                utxo.out_ref,
                validator.hash()
            )));
        }
        let witness_datum = match &utxo.output.datum {
            OutputDatum::Inline(_) => None,
            OutputDatum::Hash(h) => {
                if datum.hash()? != *h {
                    return Err(Error::Encoding(format!(
                        "datum does not match hash {h} of output {}",
                        utxo.out_ref
                    )));
                }
                Some(datum.clone())
            }
            OutputDatum::None => {
                return Err(Error::Encoding(format!(
                    "script output {} carries no datum",
                    utxo.out_ref
                )));
            }
        };
        self.script_inputs.push(ScriptInput {
            utxo: utxo.clone(),
            redeemer,
            script_hash: validator.hash(),
            script_bytes: validator.script_bytes().to_vec(),
            witness_datum,
        });
        Ok(self)
    }

    pub fn pay_to(&mut self, output: TxOutput) -> &mut Self {
        self.outputs.push(output);
        self
    }

    pub fn require_signer(&mut self, key_hash: KeyHash) -> &mut Self {
        if !self.required_signers.contains(&key_hash) {
            self.required_signers.push(key_hash);
        }
        self
    }

    /// Lower validity bound (inclusive).
    pub fn valid_from_slot(&mut self, slot: u64) -> &mut Self {
        self.valid_from_slot = Some(slot);
        self
    }

    /// Upper validity bound (exclusive).
    pub fn valid_until_slot(&mut self, slot: u64) -> &mut Self {
        self.valid_until_slot = Some(slot);
        self
    }

    pub fn script_inputs(&self) -> &[ScriptInput] {
        &self.script_inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn required_signers(&self) -> &[KeyHash] {
        &self.required_signers
    }

    pub fn validity(&self) -> (Option<u64>, Option<u64>) {
        (self.valid_from_slot, self.valid_until_slot)
    }
}

/// Fee components of a finalized transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeBreakdown {
    pub size_bytes: u64,
    pub size_fee: u64,
    pub execution_fee: u64,
    pub total: u64,
}

/// Balanced transaction without signatures. Immutable once built.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    bytes: Vec<u8>,
    tx_id: TxId,
    required_signers: Vec<KeyHash>,
    fee: FeeBreakdown,
}

impl UnsignedTransaction {
    pub(crate) fn new(
        bytes: Vec<u8>,
        tx_id: TxId,
        required_signers: Vec<KeyHash>,
        fee: FeeBreakdown,
    ) -> Self {
        Self {
            bytes,
            tx_id,
            required_signers,
            fee,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// Every key that must witness: declared signers plus owners of wallet inputs.
    pub fn required_signers(&self) -> &[KeyHash] {
        &self.required_signers
    }

    pub fn fee(&self) -> FeeBreakdown {
        self.fee
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// Transaction carrying a valid witness for every required signer. Only
/// [`crate::signing::collect_signatures`] produces one.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    bytes: Vec<u8>,
    tx_id: TxId,
}

impl SignedTransaction {
    pub(crate) fn new(bytes: Vec<u8>, tx_id: TxId) -> Self {
        Self { bytes, tx_id }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}
