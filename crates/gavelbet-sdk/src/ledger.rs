//! Ledger-side data: output references, multi-asset values and outputs.

use std::collections::BTreeMap;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::hashing::{DatumHash, ScriptHash, TxId};
use crate::plutus::{FromPlutusData, PlutusData};

pub type PolicyId = ScriptHash;
pub type AssetName = Vec<u8>;

/// Reference to an output of a prior transaction. Ordered the way the
/// ledger orders transaction inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputRef {
    pub tx_id: TxId,
    pub index: u32,
}

impl OutputRef {
    pub fn new(tx_id: TxId, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl std::fmt::Display for OutputRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

/// Lovelace plus native assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Value {
    pub coin: u64,
    pub assets: BTreeMap<PolicyId, BTreeMap<AssetName, u64>>,
}

impl Value {
    pub fn lovelace(coin: u64) -> Self {
        Self {
            coin,
            assets: BTreeMap::new(),
        }
    }

    pub fn has_assets(&self) -> bool {
        self.assets.values().any(|names| names.values().any(|q| *q > 0))
    }

    pub fn with_asset(mut self, policy: PolicyId, name: AssetName, quantity: u64) -> Self {
        if quantity > 0 {
            *self.assets.entry(policy).or_default().entry(name).or_default() += quantity;
        }
        self
    }

    pub fn checked_add(&self, other: &Value) -> Result<Value> {
        let mut out = self.clone();
        out.coin = out.coin.checked_add(other.coin).ok_or(Error::ValueOverflow)?;
        for (policy, names) in &other.assets {
            let entry = out.assets.entry(*policy).or_default();
            for (name, qty) in names {
                let slot = entry.entry(name.clone()).or_default();
                *slot = slot.checked_add(*qty).ok_or(Error::ValueOverflow)?;
            }
        }
        Ok(out)
    }

    /// `self - other`, or `None` if any quantity would go negative.
    pub fn checked_sub(&self, other: &Value) -> Option<Value> {
        let mut out = self.clone();
        out.coin = out.coin.checked_sub(other.coin)?;
        for (policy, names) in &other.assets {
            for (name, qty) in names {
                if *qty == 0 {
                    continue;
                }
                let held = out.assets.get_mut(policy)?.get_mut(name)?;
                *held = held.checked_sub(*qty)?;
            }
        }
        out.normalize();
        Some(out)
    }

    /// True when every quantity in `other` is available in `self`.
    pub fn covers(&self, other: &Value) -> bool {
        self.checked_sub(other).is_some()
    }

    /// Asset quantities of `other` not yet covered by `self`, lovelace excluded.
    pub fn missing_assets(&self, other: &Value) -> Value {
        let mut missing = Value::default();
        for (policy, names) in &other.assets {
            for (name, qty) in names {
                let held = self
                    .assets
                    .get(policy)
                    .and_then(|n| n.get(name))
                    .copied()
                    .unwrap_or(0);
                if held < *qty {
                    missing = missing.with_asset(*policy, name.clone(), qty - held);
                }
            }
        }
        missing
    }

    fn normalize(&mut self) {
        for names in self.assets.values_mut() {
            names.retain(|_, q| *q > 0);
        }
        self.assets.retain(|_, names| !names.is_empty());
    }
}

/// Datum attached to an output: nothing, a hash reference, or the data inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDatum {
    None,
    Hash(DatumHash),
    /// Raw CBOR as found on chain; hashing always uses these exact bytes.
    Inline(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: Address,
    pub value: Value,
    pub datum: OutputDatum,
}

impl TxOutput {
    pub fn new(address: Address, value: Value) -> Self {
        Self {
            address,
            value,
            datum: OutputDatum::None,
        }
    }

    pub fn with_inline_datum(address: Address, value: Value, datum: &PlutusData) -> Result<Self> {
        Ok(Self {
            address,
            value,
            datum: OutputDatum::Inline(datum.to_cbor()?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub out_ref: OutputRef,
    pub output: TxOutput,
}

impl UnspentOutput {
    pub fn new(out_ref: OutputRef, output: TxOutput) -> Self {
        Self { out_ref, output }
    }

    pub fn coin(&self) -> u64 {
        self.output.value.coin
    }

    /// Hash of the attached datum, `None` when nothing is attached.
    pub fn datum_hash(&self) -> Option<DatumHash> {
        match &self.output.datum {
            OutputDatum::None => None,
            OutputDatum::Hash(h) => Some(*h),
            OutputDatum::Inline(raw) => Some(DatumHash::of(raw)),
        }
    }

    /// Inline datum decoded as structured data.
    pub fn decode_datum(&self) -> Result<PlutusData> {
        match &self.output.datum {
            OutputDatum::Inline(raw) => PlutusData::from_cbor(raw),
            OutputDatum::Hash(h) => Err(Error::Encoding(format!(
                "output {} only carries datum hash {h}",
                self.out_ref
            ))),
            OutputDatum::None => Err(Error::Encoding(format!(
                "output {} carries no datum",
                self.out_ref
            ))),
        }
    }

    /// Inline datum decoded into a contract state.
    pub fn decode_state<T: FromPlutusData>(&self) -> Result<T> {
        T::from_plutus_data(&self.decode_datum()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(b: u8) -> PolicyId {
        ScriptHash([b; 28])
    }

    #[test]
    fn add_and_sub_multi_asset() {
        let a = Value::lovelace(5_000_000).with_asset(policy(1), b"tok".to_vec(), 10);
        let b = Value::lovelace(1_000_000).with_asset(policy(1), b"tok".to_vec(), 4);
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.coin, 6_000_000);
        assert_eq!(sum.assets[&policy(1)][b"tok".as_slice()], 14);

        let diff = a.checked_sub(&b).unwrap();
        assert_eq!(diff.coin, 4_000_000);
        assert_eq!(diff.assets[&policy(1)][b"tok".as_slice()], 6);
    }

    #[test]
    fn sub_to_zero_drops_asset() {
        let a = Value::lovelace(2).with_asset(policy(2), vec![], 3);
        let diff = a.checked_sub(&a).unwrap();
        assert_eq!(diff, Value::lovelace(0));
        assert!(!diff.has_assets());
    }

    #[test]
    fn covers_checks_every_asset() {
        let held = Value::lovelace(10).with_asset(policy(1), vec![1], 1);
        assert!(held.covers(&Value::lovelace(10)));
        assert!(!held.covers(&Value::lovelace(11)));
        assert!(!held.covers(&Value::lovelace(1).with_asset(policy(3), vec![1], 1)));
        let missing = held.missing_assets(&Value::lovelace(0).with_asset(policy(1), vec![1], 3));
        assert_eq!(missing.assets[&policy(1)][[1u8].as_slice()], 2);
    }

    #[test]
    fn output_ref_orders_by_tx_then_index() {
        let a = OutputRef::new(TxId([1; 32]), 5);
        let b = OutputRef::new(TxId([1; 32]), 6);
        let c = OutputRef::new(TxId([2; 32]), 0);
        let mut refs = vec![c, b, a];
        refs.sort();
        assert_eq!(refs, vec![a, b, c]);
    }

    #[test]
    fn inline_datum_hash_uses_raw_bytes() {
        let addr = Address::enterprise_key(crate::Network::Preview, crate::KeyHash([0; 28]));
        let datum = PlutusData::unit(0);
        let output = TxOutput::with_inline_datum(addr, Value::lovelace(1), &datum).unwrap();
        let utxo = UnspentOutput::new(OutputRef::new(TxId([0; 32]), 0), output);
        assert_eq!(utxo.datum_hash(), Some(datum.hash().unwrap()));
        assert_eq!(utxo.decode_datum().unwrap(), datum);
    }
}
