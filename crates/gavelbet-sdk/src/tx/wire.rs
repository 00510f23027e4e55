//! Conway-era transaction CBOR.
//!
//! Bodies and witness sets are encoded in the map forms the ledger expects.
//! Decoding keeps the original body bytes (the transaction id is their hash)
//! and the raw bytes of every witness-set field except vkey witnesses, so a
//! signer can append a witness without disturbing the script data hash.

use std::collections::BTreeMap;
use std::convert::Infallible;

use minicbor::data::{Tag, Type};
use minicbor::{Decoder, Encoder};

use crate::address::Address;
use crate::error::{Error, Result};
use crate::hashing::{DatumHash, KeyHash, ScriptDataHash, TxId, blake2b_256};
use crate::ledger::{OutputDatum, OutputRef, TxOutput, Value};
use crate::params::ExUnits;
use crate::plutus::{PlutusData, consume_break, decode_bytes, decode_data, encode_data};

type Enc = Encoder<Vec<u8>>;
type EncodeResult = std::result::Result<(), minicbor::encode::Error<Infallible>>;

const SET_TAG: u64 = 258;
const ENCODED_CBOR_TAG: u64 = 24;
const PLUTUS_V3_LANGUAGE_ID: u8 = 2;

mod body_key {
    pub const INPUTS: u64 = 0;
    pub const OUTPUTS: u64 = 1;
    pub const FEE: u64 = 2;
    pub const TTL: u64 = 3;
    pub const VALIDITY_START: u64 = 8;
    pub const SCRIPT_DATA_HASH: u64 = 11;
    pub const COLLATERAL: u64 = 13;
    pub const REQUIRED_SIGNERS: u64 = 14;
    pub const COLLATERAL_RETURN: u64 = 16;
    pub const TOTAL_COLLATERAL: u64 = 17;
}

mod witness_key {
    pub const VKEYS: u64 = 0;
    pub const PLUTUS_DATA: u64 = 4;
    pub const REDEEMERS: u64 = 5;
    pub const PLUTUS_V3_SCRIPTS: u64 = 7;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxBody {
    pub inputs: Vec<OutputRef>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
    pub ttl: Option<u64>,
    pub validity_start: Option<u64>,
    pub script_data_hash: Option<ScriptDataHash>,
    pub collateral: Vec<OutputRef>,
    pub required_signers: Vec<KeyHash>,
    pub collateral_return: Option<TxOutput>,
    pub total_collateral: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RedeemerTag {
    Spend = 0,
    Mint = 1,
    Cert = 2,
    Reward = 3,
}

impl RedeemerTag {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Spend),
            1 => Ok(Self::Mint),
            2 => Ok(Self::Cert),
            3 => Ok(Self::Reward),
            other => Err(Error::Encoding(format!("unsupported redeemer tag {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redeemer {
    pub tag: RedeemerTag,
    pub index: u32,
    pub data: PlutusData,
    pub ex_units: ExUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VKeyWitness {
    pub vkey: [u8; 32],
    pub signature: [u8; 64],
}

impl VKeyWitness {
    pub fn key_hash(&self) -> KeyHash {
        KeyHash::of_verification_key(&self.vkey)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WitnessSet {
    pub vkeys: Vec<VKeyWitness>,
    raw: BTreeMap<u64, Vec<u8>>,
}

impl WitnessSet {
    pub fn set_plutus_data(&mut self, data: &[PlutusData]) -> Result<()> {
        if data.is_empty() {
            self.raw.remove(&witness_key::PLUTUS_DATA);
            return Ok(());
        }
        let mut enc = Encoder::new(Vec::new());
        enc.array(data.len() as u64)?;
        for d in data {
            encode_data(&mut enc, d)?;
        }
        self.raw.insert(witness_key::PLUTUS_DATA, enc.into_writer());
        Ok(())
    }

    pub fn set_redeemers(&mut self, redeemers: &[Redeemer]) -> Result<()> {
        if redeemers.is_empty() {
            self.raw.remove(&witness_key::REDEEMERS);
            return Ok(());
        }
        let mut enc = Encoder::new(Vec::new());
        enc.array(redeemers.len() as u64)?;
        for r in redeemers {
            enc.array(4)?;
            enc.u8(r.tag as u8)?;
            enc.u32(r.index)?;
            encode_data(&mut enc, &r.data)?;
            enc.array(2)?;
            enc.u64(r.ex_units.mem)?;
            enc.u64(r.ex_units.steps)?;
        }
        self.raw.insert(witness_key::REDEEMERS, enc.into_writer());
        Ok(())
    }

    pub fn set_plutus_v3_scripts(&mut self, scripts: &[Vec<u8>]) -> Result<()> {
        if scripts.is_empty() {
            self.raw.remove(&witness_key::PLUTUS_V3_SCRIPTS);
            return Ok(());
        }
        let mut enc = Encoder::new(Vec::new());
        enc.array(scripts.len() as u64)?;
        for s in scripts {
            enc.bytes(s)?;
        }
        self.raw.insert(witness_key::PLUTUS_V3_SCRIPTS, enc.into_writer());
        Ok(())
    }

    /// Add or replace the witness for `witness.vkey`.
    pub fn add_vkey_witness(&mut self, witness: VKeyWitness) {
        match self.vkeys.iter_mut().find(|w| w.vkey == witness.vkey) {
            Some(existing) => *existing = witness,
            None => self.vkeys.push(witness),
        }
    }

    pub fn plutus_data(&self) -> Result<Vec<PlutusData>> {
        let Some(raw) = self.raw.get(&witness_key::PLUTUS_DATA) else {
            return Ok(Vec::new());
        };
        let mut d = Decoder::new(raw);
        let mut out = Vec::new();
        let len = array_or_set(&mut d)?;
        let mut i = 0;
        while has_next(&mut d, len, i)? {
            out.push(decode_data(&mut d, 0)?);
            i += 1;
        }
        Ok(out)
    }

    pub fn redeemers(&self) -> Result<Vec<Redeemer>> {
        let Some(raw) = self.raw.get(&witness_key::REDEEMERS) else {
            return Ok(Vec::new());
        };
        let mut d = Decoder::new(raw);
        let mut out = Vec::new();
        match d.datatype()? {
            Type::Map | Type::MapIndef => {
                let len = d.map()?;
                let mut i = 0;
                while has_next(&mut d, len, i)? {
                    d.array()?;
                    let tag = RedeemerTag::from_u8(d.u8()?)?;
                    let index = d.u32()?;
                    d.array()?;
                    let data = decode_data(&mut d, 0)?;
                    let ex_units = decode_ex_units(&mut d)?;
                    out.push(Redeemer {
                        tag,
                        index,
                        data,
                        ex_units,
                    });
                    i += 1;
                }
            }
            _ => {
                let len = d.array()?;
                let mut i = 0;
                while has_next(&mut d, len, i)? {
                    d.array()?;
                    let tag = RedeemerTag::from_u8(d.u8()?)?;
                    let index = d.u32()?;
                    let data = decode_data(&mut d, 0)?;
                    let ex_units = decode_ex_units(&mut d)?;
                    out.push(Redeemer {
                        tag,
                        index,
                        data,
                        ex_units,
                    });
                    i += 1;
                }
            }
        }
        Ok(out)
    }

    pub fn plutus_v3_scripts(&self) -> Result<Vec<Vec<u8>>> {
        let Some(raw) = self.raw.get(&witness_key::PLUTUS_V3_SCRIPTS) else {
            return Ok(Vec::new());
        };
        let mut d = Decoder::new(raw);
        let len = array_or_set(&mut d)?;
        let mut out = Vec::new();
        let mut i = 0;
        while has_next(&mut d, len, i)? {
            out.push(decode_bytes(&mut d)?);
            i += 1;
        }
        Ok(out)
    }

    /// Hash binding redeemers, witness datums and the V3 cost model, exactly
    /// as they are serialized in this witness set.
    pub fn script_data_hash(&self, plutus_v3_cost_model: &[i64]) -> Result<Option<ScriptDataHash>> {
        let redeemers = self.raw.get(&witness_key::REDEEMERS);
        let datums = self.raw.get(&witness_key::PLUTUS_DATA);
        if redeemers.is_none() && datums.is_none() {
            return Ok(None);
        }
        let mut preimage = Vec::new();
        match redeemers {
            Some(r) => {
                preimage.extend_from_slice(r);
                if let Some(dt) = datums {
                    preimage.extend_from_slice(dt);
                }
                let mut enc = Encoder::new(Vec::new());
                enc.map(1)?;
                enc.u8(PLUTUS_V3_LANGUAGE_ID)?;
                enc.array(plutus_v3_cost_model.len() as u64)?;
                for c in plutus_v3_cost_model {
                    enc.i64(*c)?;
                }
                preimage.extend_from_slice(&enc.into_writer());
            }
            None => {
                // Datums without scripts: empty redeemers, the datums, empty views.
                preimage.push(0x80);
                if let Some(dt) = datums {
                    preimage.extend_from_slice(dt);
                }
                preimage.push(0xa0);
            }
        }
        Ok(Some(ScriptDataHash(blake2b_256(&preimage))))
    }

    fn encode(&self, enc: &mut Enc) -> EncodeResult {
        let count = self.raw.len() as u64 + u64::from(!self.vkeys.is_empty());
        enc.map(count)?;
        if !self.vkeys.is_empty() {
            enc.u64(witness_key::VKEYS)?;
            enc.array(self.vkeys.len() as u64)?;
            for w in &self.vkeys {
                enc.array(2)?;
                enc.bytes(&w.vkey)?;
                enc.bytes(&w.signature)?;
            }
        }
        for (key, raw) in &self.raw {
            enc.u64(*key)?;
            enc.writer_mut().extend_from_slice(raw);
        }
        Ok(())
    }

    fn decode(d: &mut Decoder<'_>) -> Result<Self> {
        let mut ws = WitnessSet::default();
        let len = d.map()?;
        let mut i = 0;
        while has_next(d, len, i)? {
            let key = d.u64()?;
            if key == witness_key::VKEYS {
                let n = array_or_set(d)?;
                let mut j = 0;
                while has_next(d, n, j)? {
                    d.array()?;
                    let vkey: [u8; 32] = decode_bytes(d)?
                        .try_into()
                        .map_err(|_| Error::Encoding("vkey must be 32 bytes".into()))?;
                    let signature: [u8; 64] = decode_bytes(d)?
                        .try_into()
                        .map_err(|_| Error::Encoding("signature must be 64 bytes".into()))?;
                    ws.vkeys.push(VKeyWitness { vkey, signature });
                    j += 1;
                }
            } else {
                let raw = capture_raw(d)?;
                ws.raw.insert(key, raw);
            }
            i += 1;
        }
        Ok(ws)
    }
}

/// A full transaction. The body is kept as the exact bytes it was built or
/// received with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    body_bytes: Vec<u8>,
    body: TxBody,
    pub witnesses: WitnessSet,
    is_valid: bool,
    auxiliary_data: Option<Vec<u8>>,
}

impl Transaction {
    pub fn new(body: TxBody, witnesses: WitnessSet) -> Result<Self> {
        let body_bytes = encode_body(&body)?;
        Ok(Self {
            body_bytes,
            body,
            witnesses,
            is_valid: true,
            auxiliary_data: None,
        })
    }

    pub fn id(&self) -> TxId {
        TxId::of_body(&self.body_bytes)
    }

    pub fn body(&self) -> &TxBody {
        &self.body
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body_bytes
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new(Vec::new());
        enc.array(4)?;
        enc.writer_mut().extend_from_slice(&self.body_bytes);
        self.witnesses.encode(&mut enc)?;
        enc.bool(self.is_valid)?;
        match &self.auxiliary_data {
            Some(raw) => {
                enc.writer_mut().extend_from_slice(raw);
            }
            None => {
                enc.null()?;
            }
        }
        Ok(enc.into_writer())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(bytes);
        let len = d.array()?;
        if !matches!(len, Some(3) | Some(4)) {
            return Err(Error::Encoding("transaction must be a 3 or 4 element array".into()));
        }
        let body_bytes = capture_raw(&mut d)?;
        let body = decode_body(&body_bytes)?;
        let witnesses = WitnessSet::decode(&mut d)?;
        let is_valid = if len == Some(4) { d.bool()? } else { true };
        let auxiliary_data = if d.datatype()? == Type::Null {
            d.null()?;
            None
        } else {
            Some(capture_raw(&mut d)?)
        };
        if d.position() != bytes.len() {
            return Err(Error::Encoding("trailing bytes after transaction".into()));
        }
        Ok(Self {
            body_bytes,
            body,
            witnesses,
            is_valid,
            auxiliary_data,
        })
    }
}

// ── Body ─────────────────────────────────────────────────────────────────

pub fn encode_body(body: &TxBody) -> Result<Vec<u8>> {
    let mut enc = Encoder::new(Vec::new());
    let count = 3
        + u64::from(body.ttl.is_some())
        + u64::from(body.validity_start.is_some())
        + u64::from(body.script_data_hash.is_some())
        + u64::from(!body.collateral.is_empty())
        + u64::from(!body.required_signers.is_empty())
        + u64::from(body.collateral_return.is_some())
        + u64::from(body.total_collateral.is_some());
    enc.map(count)?;

    enc.u64(body_key::INPUTS)?;
    encode_refs(&mut enc, &body.inputs)?;

    enc.u64(body_key::OUTPUTS)?;
    enc.array(body.outputs.len() as u64)?;
    for output in &body.outputs {
        encode_output(&mut enc, output)?;
    }

    enc.u64(body_key::FEE)?.u64(body.fee)?;

    if let Some(ttl) = body.ttl {
        enc.u64(body_key::TTL)?.u64(ttl)?;
    }
    if let Some(start) = body.validity_start {
        enc.u64(body_key::VALIDITY_START)?.u64(start)?;
    }
    if let Some(h) = &body.script_data_hash {
        enc.u64(body_key::SCRIPT_DATA_HASH)?.bytes(h.as_bytes())?;
    }
    if !body.collateral.is_empty() {
        enc.u64(body_key::COLLATERAL)?;
        encode_refs(&mut enc, &body.collateral)?;
    }
    if !body.required_signers.is_empty() {
        enc.u64(body_key::REQUIRED_SIGNERS)?;
        enc.array(body.required_signers.len() as u64)?;
        for kh in &body.required_signers {
            enc.bytes(kh.as_bytes())?;
        }
    }
    if let Some(ret) = &body.collateral_return {
        enc.u64(body_key::COLLATERAL_RETURN)?;
        encode_output(&mut enc, ret)?;
    }
    if let Some(total) = body.total_collateral {
        enc.u64(body_key::TOTAL_COLLATERAL)?.u64(total)?;
    }
    Ok(enc.into_writer())
}

pub fn decode_body(bytes: &[u8]) -> Result<TxBody> {
    let mut d = Decoder::new(bytes);
    let mut body = TxBody::default();
    let len = d.map()?;
    let mut i = 0;
    while has_next(&mut d, len, i)? {
        match d.u64()? {
            body_key::INPUTS => body.inputs = decode_refs(&mut d)?,
            body_key::OUTPUTS => {
                let n = d.array()?;
                let mut j = 0;
                while has_next(&mut d, n, j)? {
                    body.outputs.push(decode_output(&mut d)?);
                    j += 1;
                }
            }
            body_key::FEE => body.fee = d.u64()?,
            body_key::TTL => body.ttl = Some(d.u64()?),
            body_key::VALIDITY_START => body.validity_start = Some(d.u64()?),
            body_key::SCRIPT_DATA_HASH => {
                body.script_data_hash = Some(ScriptDataHash::from_slice(d.bytes()?)?)
            }
            body_key::COLLATERAL => body.collateral = decode_refs(&mut d)?,
            body_key::REQUIRED_SIGNERS => {
                let n = array_or_set(&mut d)?;
                let mut j = 0;
                while has_next(&mut d, n, j)? {
                    body.required_signers.push(KeyHash::from_slice(d.bytes()?)?);
                    j += 1;
                }
            }
            body_key::COLLATERAL_RETURN => body.collateral_return = Some(decode_output(&mut d)?),
            body_key::TOTAL_COLLATERAL => body.total_collateral = Some(d.u64()?),
            other => {
                log::debug!("skipping unsupported body field {other}");
                d.skip()?;
            }
        }
        i += 1;
    }
    Ok(body)
}

fn encode_refs(enc: &mut Enc, refs: &[OutputRef]) -> EncodeResult {
    enc.array(refs.len() as u64)?;
    for r in refs {
        enc.array(2)?;
        enc.bytes(r.tx_id.as_bytes())?;
        enc.u32(r.index)?;
    }
    Ok(())
}

fn decode_refs(d: &mut Decoder<'_>) -> Result<Vec<OutputRef>> {
    let len = array_or_set(d)?;
    let mut refs = Vec::new();
    let mut i = 0;
    while has_next(d, len, i)? {
        d.array()?;
        let tx_id = TxId::from_slice(d.bytes()?)?;
        let index = d.u32()?;
        refs.push(OutputRef::new(tx_id, index));
        i += 1;
    }
    Ok(refs)
}

// ── Outputs ──────────────────────────────────────────────────────────────

/// Serialized size of one output, as used by the minimum-lovelace rule.
pub fn output_size(output: &TxOutput) -> Result<u64> {
    let mut enc = Encoder::new(Vec::new());
    encode_output(&mut enc, output)?;
    Ok(enc.into_writer().len() as u64)
}

fn encode_output(enc: &mut Enc, output: &TxOutput) -> EncodeResult {
    let has_datum = !matches!(output.datum, OutputDatum::None);
    enc.map(2 + u64::from(has_datum))?;
    enc.u8(0)?.bytes(&output.address.to_bytes())?;
    enc.u8(1)?;
    encode_value(enc, &output.value)?;
    match &output.datum {
        OutputDatum::None => {}
        OutputDatum::Hash(h) => {
            enc.u8(2)?.array(2)?.u8(0)?.bytes(h.as_bytes())?;
        }
        OutputDatum::Inline(raw) => {
            enc.u8(2)?.array(2)?.u8(1)?;
            enc.tag(Tag::new(ENCODED_CBOR_TAG))?.bytes(raw)?;
        }
    }
    Ok(())
}

fn decode_output(d: &mut Decoder<'_>) -> Result<TxOutput> {
    match d.datatype()? {
        Type::Map | Type::MapIndef => {
            let len = d.map()?;
            let mut address = None;
            let mut value = None;
            let mut datum = OutputDatum::None;
            let mut i = 0;
            while has_next(d, len, i)? {
                match d.u64()? {
                    0 => address = Some(Address::from_bytes(d.bytes()?)?),
                    1 => value = Some(decode_value(d)?),
                    2 => datum = decode_datum_option(d)?,
                    _ => d.skip()?,
                }
                i += 1;
            }
            Ok(TxOutput {
                address: address.ok_or_else(|| Error::Encoding("output without address".into()))?,
                value: value.ok_or_else(|| Error::Encoding("output without value".into()))?,
                datum,
            })
        }
        _ => {
            // Pre-Babbage array form: [address, value, ? datum_hash]
            let len = d.array()?;
            let address = Address::from_bytes(d.bytes()?)?;
            let value = decode_value(d)?;
            let datum = if len == Some(3) {
                OutputDatum::Hash(DatumHash::from_slice(d.bytes()?)?)
            } else {
                OutputDatum::None
            };
            Ok(TxOutput {
                address,
                value,
                datum,
            })
        }
    }
}

fn decode_datum_option(d: &mut Decoder<'_>) -> Result<OutputDatum> {
    d.array()?;
    match d.u8()? {
        0 => Ok(OutputDatum::Hash(DatumHash::from_slice(d.bytes()?)?)),
        1 => {
            let tag = d.tag()?.as_u64();
            if tag != ENCODED_CBOR_TAG {
                return Err(Error::Encoding(format!("inline datum under tag {tag}")));
            }
            Ok(OutputDatum::Inline(decode_bytes(d)?))
        }
        other => Err(Error::Encoding(format!("unknown datum option {other}"))),
    }
}

fn encode_value(enc: &mut Enc, value: &Value) -> EncodeResult {
    if !value.has_assets() {
        enc.u64(value.coin)?;
        return Ok(());
    }
    enc.array(2)?;
    enc.u64(value.coin)?;
    let policies: Vec<_> = value
        .assets
        .iter()
        .filter(|(_, names)| names.values().any(|q| *q > 0))
        .collect();
    enc.map(policies.len() as u64)?;
    for (policy, names) in policies {
        enc.bytes(policy.as_bytes())?;
        let names: Vec<_> = names.iter().filter(|(_, q)| **q > 0).collect();
        enc.map(names.len() as u64)?;
        for (name, qty) in names {
            enc.bytes(name)?;
            enc.u64(*qty)?;
        }
    }
    Ok(())
}

fn decode_value(d: &mut Decoder<'_>) -> Result<Value> {
    match d.datatype()? {
        Type::Array | Type::ArrayIndef => {
            d.array()?;
            let mut value = Value::lovelace(d.u64()?);
            let policies = d.map()?;
            let mut i = 0;
            while has_next(d, policies, i)? {
                let policy = crate::hashing::ScriptHash::from_slice(d.bytes()?)?;
                let names = d.map()?;
                let mut j = 0;
                while has_next(d, names, j)? {
                    let name = decode_bytes(d)?;
                    let qty = d.u64()?;
                    value = value.with_asset(policy, name, qty);
                    j += 1;
                }
                i += 1;
            }
            Ok(value)
        }
        _ => Ok(Value::lovelace(d.u64()?)),
    }
}

fn decode_ex_units(d: &mut Decoder<'_>) -> Result<ExUnits> {
    d.array()?;
    Ok(ExUnits::new(d.u64()?, d.u64()?))
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Array length, accepting the Conway set tag in front of it.
fn array_or_set(d: &mut Decoder<'_>) -> Result<Option<u64>> {
    if d.datatype()? == Type::Tag {
        let tag = d.tag()?.as_u64();
        if tag != SET_TAG {
            return Err(Error::Encoding(format!("unexpected tag {tag} before set")));
        }
    }
    Ok(d.array()?)
}

/// Whether item `i` of a definite (`Some(len)`) or indefinite container
/// exists. Consumes the terminating break of an indefinite container.
fn has_next(d: &mut Decoder<'_>, len: Option<u64>, i: u64) -> Result<bool> {
    match len {
        Some(n) => Ok(i < n),
        None => {
            if d.datatype()? == Type::Break {
                consume_break(d);
                Ok(false)
            } else {
                Ok(true)
            }
        }
    }
}

/// Skip one item and return its exact bytes.
fn capture_raw(d: &mut Decoder<'_>) -> Result<Vec<u8>> {
    let start = d.position();
    d.skip()?;
    Ok(d.input()[start..d.position()].to_vec())
}
