use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::hashing::{DatumHash, ScriptHash, TxId};
use crate::ledger::{OutputDatum, OutputRef, TxOutput, UnspentOutput, Value};
use crate::network::Network;
use crate::params::{ExUnits, ProtocolParams, Rational};

/// Page size Blockfrost allows for list endpoints.
const PAGE_SIZE: usize = 100;

/// Backend for querying the Cardano ledger and submitting transactions.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Unspent outputs currently sitting at `address`.
    async fn fetch_outputs_at_address(&self, address: &Address) -> Result<Vec<UnspentOutput>>;

    /// Unspent outputs created by `tx_id`. Before the provider has indexed
    /// the transaction this is `Error::NotFound` or empty.
    async fn fetch_outputs_by_tx(&self, tx_id: &TxId) -> Result<Vec<UnspentOutput>>;

    /// Submit a signed transaction and return its id.
    async fn submit_transaction(&self, tx_bytes: &[u8]) -> Result<TxId>;

    async fn protocol_params(&self) -> Result<ProtocolParams>;
}

#[async_trait]
impl<T: ChainBackend + ?Sized> ChainBackend for Arc<T> {
    async fn fetch_outputs_at_address(&self, address: &Address) -> Result<Vec<UnspentOutput>> {
        (**self).fetch_outputs_at_address(address).await
    }

    async fn fetch_outputs_by_tx(&self, tx_id: &TxId) -> Result<Vec<UnspentOutput>> {
        (**self).fetch_outputs_by_tx(tx_id).await
    }

    async fn submit_transaction(&self, tx_bytes: &[u8]) -> Result<TxId> {
        (**self).submit_transaction(tx_bytes).await
    }

    async fn protocol_params(&self) -> Result<ProtocolParams> {
        (**self).protocol_params().await
    }
}

/// Blockfrost-based chain backend.
pub struct BlockfrostBackend {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
}

impl BlockfrostBackend {
    pub fn new(network: Network, project_id: &str) -> Self {
        Self::with_base_url(network.blockfrost_url(), project_id)
    }

    /// Point at a self-hosted or proxied instance.
    pub fn with_base_url(base_url: &str, project_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("project_id", &self.project_id)
            .send()
            .await
            .map_err(|e| Error::Query(format!("GET {path}: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Query(format!("GET {path}: {status}: {body}")));
        }
        resp.json()
            .await
            .map_err(|e| Error::Query(format!("GET {path}: bad response: {e}")))
    }
}

#[async_trait]
impl ChainBackend for BlockfrostBackend {
    async fn fetch_outputs_at_address(&self, address: &Address) -> Result<Vec<UnspentOutput>> {
        let bech32 = address.to_bech32()?;
        let mut results = Vec::new();
        for page in 1.. {
            let path = format!("/addresses/{bech32}/utxos?page={page}&count={PAGE_SIZE}");
            let entries: Vec<BfAddressUtxo> = match self.get(&path).await {
                Ok(entries) => entries,
                // Addresses that never received anything are unknown to the indexer.
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => return Err(e),
            };
            let done = entries.len() < PAGE_SIZE;
            results.extend(usable_outputs(entries));
            if done {
                break;
            }
        }
        log::debug!("{} outputs at {address}", results.len());
        Ok(results)
    }

    async fn fetch_outputs_by_tx(&self, tx_id: &TxId) -> Result<Vec<UnspentOutput>> {
        let tx: BfTxUtxos = self.get(&format!("/txs/{tx_id}/utxos")).await?;
        tx.outputs
            .into_iter()
            .filter(|o| o.consumed_by_tx.is_none())
            .map(|o| o.into_unspent(*tx_id))
            .collect()
    }

    async fn submit_transaction(&self, tx_bytes: &[u8]) -> Result<TxId> {
        let resp = self
            .client
            .post(format!("{}/tx/submit", self.base_url))
            .header("project_id", &self.project_id)
            .header(reqwest::header::CONTENT_TYPE, "application/cbor")
            .body(tx_bytes.to_vec())
            .send()
            .await
            .map_err(|e| Error::Submission(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::Submission(format!("{status}: {body}")));
        }
        let hash: String = serde_json::from_str(&body)
            .map_err(|e| Error::Submission(format!("unexpected submit response {body:?}: {e}")))?;
        hash.parse()
    }

    async fn protocol_params(&self) -> Result<ProtocolParams> {
        let p: BfParams = self.get("/epochs/latest/parameters").await?;
        p.try_into()
    }
}

// ── Blockfrost response shapes ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BfAmount {
    unit: String,
    quantity: String,
}

/// Converts a page of address entries, skipping any the provider sent malformed.
fn usable_outputs(entries: Vec<BfAddressUtxo>) -> Vec<UnspentOutput> {
    let mut outputs = Vec::with_capacity(entries.len());
    for entry in entries {
        let location = format!("{}#{}", entry.tx_hash, entry.output_index);
        match entry.into_unspent() {
            Ok(utxo) => outputs.push(utxo),
            Err(e) => log::warn!("skipping malformed output {location}: {e}"),
        }
    }
    outputs
}

#[derive(Debug, Deserialize)]
struct BfAddressUtxo {
    address: String,
    tx_hash: String,
    output_index: u32,
    amount: Vec<BfAmount>,
    data_hash: Option<String>,
    inline_datum: Option<String>,
}

impl BfAddressUtxo {
    fn into_unspent(self) -> Result<UnspentOutput> {
        let tx_id: TxId = self.tx_hash.parse()?;
        Ok(UnspentOutput::new(
            OutputRef::new(tx_id, self.output_index),
            parse_output(&self.address, &self.amount, self.data_hash, self.inline_datum)?,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct BfTxUtxos {
    outputs: Vec<BfTxOutput>,
}

#[derive(Debug, Deserialize)]
struct BfTxOutput {
    address: String,
    output_index: u32,
    amount: Vec<BfAmount>,
    data_hash: Option<String>,
    inline_datum: Option<String>,
    #[serde(default)]
    consumed_by_tx: Option<String>,
}

impl BfTxOutput {
    fn into_unspent(self, tx_id: TxId) -> Result<UnspentOutput> {
        Ok(UnspentOutput::new(
            OutputRef::new(tx_id, self.output_index),
            parse_output(&self.address, &self.amount, self.data_hash, self.inline_datum)?,
        ))
    }
}

fn parse_output(
    address: &str,
    amount: &[BfAmount],
    data_hash: Option<String>,
    inline_datum: Option<String>,
) -> Result<TxOutput> {
    let address = Address::from_bech32(address)?;
    let mut value = Value::default();
    for a in amount {
        let qty: u64 = a
            .quantity
            .parse()
            .map_err(|e| Error::Query(format!("bad quantity {:?}: {e}", a.quantity)))?;
        if a.unit == "lovelace" {
            value.coin = value.coin.checked_add(qty).ok_or(Error::ValueOverflow)?;
            continue;
        }
        if a.unit.len() < ScriptHash::LEN * 2 {
            return Err(Error::Query(format!("bad asset unit {}", a.unit)));
        }
        let (policy, name) = a.unit.split_at(ScriptHash::LEN * 2);
        let name = hex::decode(name).map_err(|e| Error::Query(format!("bad asset name: {e}")))?;
        value = value.with_asset(policy.parse()?, name, qty);
    }
    let datum = match (inline_datum, data_hash) {
        (Some(raw), _) => OutputDatum::Inline(
            hex::decode(&raw).map_err(|e| Error::Query(format!("bad inline datum: {e}")))?,
        ),
        (None, Some(h)) => OutputDatum::Hash(h.parse::<DatumHash>()?),
        (None, None) => OutputDatum::None,
    };
    Ok(TxOutput {
        address,
        value,
        datum,
    })
}

#[derive(Debug, Deserialize)]
struct BfParams {
    min_fee_a: u64,
    min_fee_b: u64,
    coins_per_utxo_size: Option<serde_json::Value>,
    price_mem: serde_json::Number,
    price_step: serde_json::Number,
    collateral_percent: u64,
    max_collateral_inputs: u32,
    max_tx_size: u64,
    max_tx_ex_mem: serde_json::Value,
    max_tx_ex_steps: serde_json::Value,
    #[serde(default)]
    cost_models_raw: Option<serde_json::Map<String, serde_json::Value>>,
}

impl TryFrom<BfParams> for ProtocolParams {
    type Error = Error;

    fn try_from(p: BfParams) -> Result<Self> {
        let coins_per_utxo_byte = p
            .coins_per_utxo_size
            .as_ref()
            .map(lenient_u64)
            .transpose()?
            .ok_or_else(|| Error::Query("coins_per_utxo_size missing".into()))?;
        let plutus_v3_cost_model = p
            .cost_models_raw
            .as_ref()
            .and_then(|m| m.get("PlutusV3"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::Query("PlutusV3 cost model missing".into()))?
            .iter()
            .map(|v| {
                v.as_i64()
                    .ok_or_else(|| Error::Query(format!("bad cost model entry {v}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ProtocolParams {
            min_fee_a: p.min_fee_a,
            min_fee_b: p.min_fee_b,
            coins_per_utxo_byte,
            price_mem: json_rational(&p.price_mem)?,
            price_steps: json_rational(&p.price_step)?,
            collateral_percent: p.collateral_percent,
            max_collateral_inputs: p.max_collateral_inputs,
            max_tx_size: p.max_tx_size,
            max_tx_ex_units: ExUnits::new(lenient_u64(&p.max_tx_ex_mem)?, lenient_u64(&p.max_tx_ex_steps)?),
            plutus_v3_cost_model,
        })
    }
}

/// Blockfrost serializes large integers as strings.
fn lenient_u64(v: &serde_json::Value) -> Result<u64> {
    match v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| Error::Query(format!("expected unsigned integer, got {v}")))
}

/// Exact rational from a JSON number, including exponent notation.
fn json_rational(n: &serde_json::Number) -> Result<Rational> {
    let s = n.to_string();
    let Some((mantissa, exp)) = s.split_once(['e', 'E']) else {
        return Rational::from_decimal(&s);
    };
    let base = Rational::from_decimal(mantissa)?;
    let exp: i32 = exp
        .parse()
        .map_err(|e| Error::Query(format!("bad exponent in {s}: {e}")))?;
    let scale = 10u64
        .checked_pow(exp.unsigned_abs())
        .ok_or_else(|| Error::Query(format!("exponent out of range in {s}")))?;
    if exp < 0 {
        Rational::new(
            base.numerator,
            base.denominator.checked_mul(scale).ok_or(Error::ValueOverflow)?,
        )
    } else {
        Rational::new(
            base.numerator.checked_mul(scale).ok_or(Error::ValueOverflow)?,
            base.denominator,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_address_utxo() {
        let json = r#"[{
            "address": "addr_test1wz2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzersg6ll8z",
            "tx_hash": "39a7a284c2a0948189dc45dec670211cd4d72f7b66c5726c08d9b3df11e44d58",
            "tx_index": 0,
            "output_index": 1,
            "amount": [
                {"unit": "lovelace", "quantity": "2000000"},
                {"unit": "b0d07d45fe9514f80213f4020e5a61241458be626841cde717cb38a74e4654", "quantity": "7"}
            ],
            "block": "7eb8e27d18686c7db9a18f8bbcfe34e3fed6e047afaa2d969904d15e934847e6",
            "data_hash": "9e478573ab81ea7a8e31891ce0648b81229f408d596a3483e6f4f9b92d3cf710",
            "inline_datum": "d87980",
            "reference_script_hash": null
        }]"#;
        let entries: Vec<BfAddressUtxo> = serde_json::from_str(json).unwrap();
        let utxo = entries.into_iter().next().unwrap().into_unspent().unwrap();
        assert_eq!(utxo.out_ref.index, 1);
        assert_eq!(utxo.coin(), 2_000_000);
        assert!(utxo.output.address.is_script());
        assert!(utxo.output.value.has_assets());
        assert_eq!(utxo.output.datum, OutputDatum::Inline(vec![0xd8, 0x79, 0x80]));
    }

    #[test]
    fn malformed_entry_does_not_hide_the_rest() {
        let json = r#"[
            {
                "address": "addr_test1wz2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzersg6ll8z",
                "tx_hash": "not-a-hash",
                "output_index": 0,
                "amount": [{"unit": "lovelace", "quantity": "1000000"}],
                "data_hash": null,
                "inline_datum": null
            },
            {
                "address": "addr_test1wz2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzersg6ll8z",
                "tx_hash": "39a7a284c2a0948189dc45dec670211cd4d72f7b66c5726c08d9b3df11e44d58",
                "output_index": 2,
                "amount": [{"unit": "lovelace", "quantity": "abc"}],
                "data_hash": null,
                "inline_datum": null
            },
            {
                "address": "addr_test1wz2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzersg6ll8z",
                "tx_hash": "39a7a284c2a0948189dc45dec670211cd4d72f7b66c5726c08d9b3df11e44d58",
                "output_index": 3,
                "amount": [{"unit": "lovelace", "quantity": "3000000"}],
                "data_hash": null,
                "inline_datum": null
            }
        ]"#;
        let entries: Vec<BfAddressUtxo> = serde_json::from_str(json).unwrap();
        let outputs = usable_outputs(entries);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].out_ref.index, 3);
        assert_eq!(outputs[0].coin(), 3_000_000);
    }

    #[test]
    fn parses_protocol_params() {
        let json = r#"{
            "min_fee_a": 44, "min_fee_b": 155381,
            "coins_per_utxo_size": "4310",
            "price_mem": 0.0577, "price_step": 7.21e-5,
            "collateral_percent": 150, "max_collateral_inputs": 3,
            "max_tx_size": 16384,
            "max_tx_ex_mem": "14000000", "max_tx_ex_steps": "10000000000",
            "cost_models_raw": {"PlutusV3": [100788, 420, -1]}
        }"#;
        let p: BfParams = serde_json::from_str(json).unwrap();
        let pp = ProtocolParams::try_from(p).unwrap();
        assert_eq!(pp.coins_per_utxo_byte, 4310);
        assert_eq!(pp.price_mem, Rational::new(577, 10_000).unwrap());
        assert_eq!(
            pp.price_steps.numerator as u128 * 10_000_000,
            721 * pp.price_steps.denominator as u128
        );
        assert_eq!(pp.max_tx_ex_units, ExUnits::new(14_000_000, 10_000_000_000));
        assert_eq!(pp.plutus_v3_cost_model, vec![100788, 420, -1]);
    }
}
