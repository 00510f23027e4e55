//! Plutus structured data: the binary record format for datums and redeemers.
//!
//! The encoding matches the ledger tooling byte for byte: constructor tags
//! 121..127 / 1280..1400 / 102, indefinite-length arrays for non-empty field
//! lists, and byte strings chunked at 64 bytes. Validators pattern-match on
//! the constructor alternative, so enumerations are always zero-field
//! constructors and never plain integers.

use std::convert::Infallible;

use minicbor::data::{Int, Tag, Type};
use minicbor::{Decoder, Encoder};

use crate::error::{Error, Result};
use crate::hashing::{DatumHash, KeyHash};

const BYTES_CHUNK: usize = 64;
const MAX_DEPTH: usize = 128;

const TAG_POS_BIGNUM: u64 = 2;
const TAG_NEG_BIGNUM: u64 = 3;
const TAG_CONSTR_GENERAL: u64 = 102;

type EncodeResult = std::result::Result<(), minicbor::encode::Error<Infallible>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlutusData {
    Constr {
        alternative: u64,
        fields: Vec<PlutusData>,
    },
    Map(Vec<(PlutusData, PlutusData)>),
    List(Vec<PlutusData>),
    Integer(i128),
    Bytes(Vec<u8>),
}

/// Conversion of a domain value into structured data.
pub trait ToPlutusData {
    fn to_plutus_data(&self) -> PlutusData;
}

/// Conversion of structured data back into a domain value.
pub trait FromPlutusData: Sized {
    fn from_plutus_data(data: &PlutusData) -> Result<Self>;
}

impl PlutusData {
    pub fn constr(alternative: u64, fields: Vec<PlutusData>) -> Self {
        PlutusData::Constr {
            alternative,
            fields,
        }
    }

    /// Zero-field constructor; the encoding of every enumeration value.
    pub fn unit(alternative: u64) -> Self {
        Self::constr(alternative, Vec::new())
    }

    pub fn integer(value: impl Into<i128>) -> Self {
        PlutusData::Integer(value.into())
    }

    pub fn bytes(value: impl AsRef<[u8]>) -> Self {
        PlutusData::Bytes(value.as_ref().to_vec())
    }

    /// Fields of a constructor with the given alternative and arity.
    pub fn expect_constr(&self, alternative: u64, arity: usize) -> Result<&[PlutusData]> {
        match self {
            PlutusData::Constr {
                alternative: alt,
                fields,
            } if *alt == alternative && fields.len() == arity => Ok(fields),
            PlutusData::Constr {
                alternative: alt,
                fields,
            } => Err(Error::Encoding(format!(
                "expected constructor {alternative} with {arity} fields, \
                 found constructor {alt} with {} fields",
                fields.len()
            ))),
            other => Err(Error::Encoding(format!(
                "expected constructor {alternative}, found {}",
                other.kind()
            ))),
        }
    }

    /// Alternative index of a zero-field constructor.
    pub fn as_unit(&self) -> Result<u64> {
        match self {
            PlutusData::Constr {
                alternative,
                fields,
            } if fields.is_empty() => Ok(*alternative),
            other => Err(Error::Encoding(format!(
                "expected zero-field constructor, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            PlutusData::Bytes(b) => Ok(b),
            other => Err(Error::Encoding(format!(
                "expected bytes, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_integer(&self) -> Result<i128> {
        match self {
            PlutusData::Integer(i) => Ok(*i),
            other => Err(Error::Encoding(format!(
                "expected integer, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        let i = self.as_integer()?;
        u64::try_from(i).map_err(|_| Error::Encoding(format!("integer {i} out of u64 range")))
    }

    pub fn as_key_hash(&self) -> Result<KeyHash> {
        KeyHash::from_slice(self.as_bytes()?)
    }

    fn kind(&self) -> &'static str {
        match self {
            PlutusData::Constr { .. } => "constructor",
            PlutusData::Map(_) => "map",
            PlutusData::List(_) => "list",
            PlutusData::Integer(_) => "integer",
            PlutusData::Bytes(_) => "bytes",
        }
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new(Vec::new());
        encode_data(&mut enc, self)?;
        Ok(enc.into_writer())
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(bytes);
        let data = decode_data(&mut d, 0)?;
        if d.position() != bytes.len() {
            return Err(Error::Encoding(format!(
                "{} trailing bytes after structured data",
                bytes.len() - d.position()
            )));
        }
        Ok(data)
    }

    /// Ledger content hash: blake2b-256 of the encoding.
    pub fn hash(&self) -> Result<DatumHash> {
        Ok(DatumHash::of(&self.to_cbor()?))
    }
}

/// Encode a domain value and hash it in one step.
pub fn datum_hash<T: ToPlutusData>(value: &T) -> Result<DatumHash> {
    value.to_plutus_data().hash()
}

// ── Encoding ─────────────────────────────────────────────────────────────

pub(crate) fn encode_data(enc: &mut Encoder<Vec<u8>>, data: &PlutusData) -> EncodeResult {
    match data {
        PlutusData::Constr {
            alternative,
            fields,
        } => match constr_tag(*alternative) {
            Some(tag) => {
                enc.tag(Tag::new(tag))?;
                encode_list(enc, fields)
            }
            None => {
                enc.tag(Tag::new(TAG_CONSTR_GENERAL))?;
                enc.array(2)?;
                enc.u64(*alternative)?;
                encode_list(enc, fields)
            }
        },
        PlutusData::Map(entries) => {
            enc.map(entries.len() as u64)?;
            for (k, v) in entries {
                encode_data(enc, k)?;
                encode_data(enc, v)?;
            }
            Ok(())
        }
        PlutusData::List(items) => encode_list(enc, items),
        PlutusData::Integer(i) => encode_integer(enc, *i),
        PlutusData::Bytes(b) => encode_bytes(enc, b),
    }
}

fn constr_tag(alternative: u64) -> Option<u64> {
    match alternative {
        0..=6 => Some(121 + alternative),
        7..=127 => Some(1280 + alternative - 7),
        _ => None,
    }
}

fn encode_list(enc: &mut Encoder<Vec<u8>>, items: &[PlutusData]) -> EncodeResult {
    if items.is_empty() {
        enc.array(0)?;
        return Ok(());
    }
    enc.begin_array()?;
    for item in items {
        encode_data(enc, item)?;
    }
    enc.end()?;
    Ok(())
}

fn encode_integer(enc: &mut Encoder<Vec<u8>>, value: i128) -> EncodeResult {
    if let Ok(int) = Int::try_from(value) {
        enc.int(int)?;
        return Ok(());
    }
    let (tag, magnitude) = if value >= 0 {
        (TAG_POS_BIGNUM, value as u128)
    } else {
        // CBOR negative bignums carry -1 - n.
        (TAG_NEG_BIGNUM, (-1 - value) as u128)
    };
    let be = magnitude.to_be_bytes();
    let first = be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1);
    enc.tag(Tag::new(tag))?;
    encode_bytes(enc, &be[first..])
}

fn encode_bytes(enc: &mut Encoder<Vec<u8>>, bytes: &[u8]) -> EncodeResult {
    if bytes.len() <= BYTES_CHUNK {
        enc.bytes(bytes)?;
        return Ok(());
    }
    enc.begin_bytes()?;
    for chunk in bytes.chunks(BYTES_CHUNK) {
        enc.bytes(chunk)?;
    }
    enc.end()?;
    Ok(())
}

// ── Decoding ─────────────────────────────────────────────────────────────

pub(crate) fn decode_data(d: &mut Decoder<'_>, depth: usize) -> Result<PlutusData> {
    if depth > MAX_DEPTH {
        return Err(Error::Encoding("structured data nested too deeply".into()));
    }
    match d.datatype()? {
        Type::Tag => {
            let tag = d.tag()?.as_u64();
            match tag {
                121..=127 => Ok(PlutusData::constr(tag - 121, decode_list(d, depth)?)),
                1280..=1400 => Ok(PlutusData::constr(tag - 1280 + 7, decode_list(d, depth)?)),
                TAG_CONSTR_GENERAL => {
                    let len = d.array()?;
                    if len != Some(2) {
                        return Err(Error::Encoding(
                            "general constructor must be a two-element array".into(),
                        ));
                    }
                    let alternative = d.u64()?;
                    Ok(PlutusData::constr(alternative, decode_list(d, depth)?))
                }
                TAG_POS_BIGNUM | TAG_NEG_BIGNUM => decode_bignum(d, tag),
                other => Err(Error::Encoding(format!("unexpected CBOR tag {other}"))),
            }
        }
        Type::Map | Type::MapIndef => {
            let len = d.map()?;
            let mut entries = Vec::new();
            match len {
                Some(n) => {
                    for _ in 0..n {
                        let k = decode_data(d, depth + 1)?;
                        let v = decode_data(d, depth + 1)?;
                        entries.push((k, v));
                    }
                }
                None => {
                    while d.datatype()? != Type::Break {
                        let k = decode_data(d, depth + 1)?;
                        let v = decode_data(d, depth + 1)?;
                        entries.push((k, v));
                    }
                    consume_break(d);
                }
            }
            Ok(PlutusData::Map(entries))
        }
        Type::Array | Type::ArrayIndef => Ok(PlutusData::List(decode_list(d, depth)?)),
        Type::Bytes | Type::BytesIndef => Ok(PlutusData::Bytes(decode_bytes(d)?)),
        Type::U8
        | Type::U16
        | Type::U32
        | Type::U64
        | Type::I8
        | Type::I16
        | Type::I32
        | Type::I64
        | Type::Int => Ok(PlutusData::Integer(i128::from(d.int()?))),
        other => Err(Error::Encoding(format!(
            "unexpected CBOR item {other:?} in structured data"
        ))),
    }
}

fn decode_list(d: &mut Decoder<'_>, depth: usize) -> Result<Vec<PlutusData>> {
    let mut items = Vec::new();
    match d.array()? {
        Some(n) => {
            for _ in 0..n {
                items.push(decode_data(d, depth + 1)?);
            }
        }
        None => {
            while d.datatype()? != Type::Break {
                items.push(decode_data(d, depth + 1)?);
            }
            consume_break(d);
        }
    }
    Ok(items)
}

pub(crate) fn decode_bytes(d: &mut Decoder<'_>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for chunk in d.bytes_iter()? {
        out.extend_from_slice(chunk?);
    }
    Ok(out)
}

fn decode_bignum(d: &mut Decoder<'_>, tag: u64) -> Result<PlutusData> {
    let bytes = decode_bytes(d)?;
    let significant: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    if significant.len() > 16 {
        return Err(Error::Encoding("bignum exceeds 128 bits".into()));
    }
    let mut be = [0u8; 16];
    be[16 - significant.len()..].copy_from_slice(&significant);
    let magnitude = u128::from_be_bytes(be);
    let magnitude = i128::try_from(magnitude)
        .map_err(|_| Error::Encoding("bignum exceeds 128 bits".into()))?;
    if tag == TAG_POS_BIGNUM {
        Ok(PlutusData::Integer(magnitude))
    } else {
        Ok(PlutusData::Integer(-1 - magnitude))
    }
}

/// Step over the one-byte break that terminates an indefinite-length item.
pub(crate) fn consume_break(d: &mut Decoder<'_>) {
    d.set_position(d.position() + 1);
}
