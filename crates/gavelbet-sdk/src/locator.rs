use crate::address::Address;
use crate::chain::ChainBackend;
use crate::error::{Error, Result};
use crate::ledger::{OutputDatum, UnspentOutput};
use crate::plutus::{FromPlutusData, ToPlutusData};

/// A contract output together with its decoded state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<S> {
    pub utxo: UnspentOutput,
    pub state: S,
}

/// Find the output at `address` whose datum is exactly `expected`.
///
/// Outputs are matched on the datum hash. Inline datums that were encoded
/// with a different (but valid) CBOR layout still match when they decode to
/// the same state. Outputs without a datum, or with a datum that fails to
/// decode, are skipped.
pub async fn find_by_state<S>(
    chain: &dyn ChainBackend,
    address: &Address,
    expected: &S,
) -> Result<UnspentOutput>
where
    S: ToPlutusData + FromPlutusData + PartialEq,
{
    let utxos = chain.fetch_outputs_at_address(address).await?;
    log::debug!("scanning {} outputs at {address}", utxos.len());
    select_by_state(utxos, expected)?
        .ok_or_else(|| Error::NotFound(format!("no output at {address} carries the expected state")))
}

/// Every output at `address` whose decoded state satisfies `predicate`.
pub async fn find_all_by_predicate<S, P>(
    chain: &dyn ChainBackend,
    address: &Address,
    predicate: P,
) -> Result<Vec<Located<S>>>
where
    S: FromPlutusData,
    P: Fn(&S) -> bool,
{
    let utxos = chain.fetch_outputs_at_address(address).await?;
    Ok(filter_by_predicate(utxos, predicate))
}

/// First output in `utxos` carrying `expected`.
pub fn select_by_state<S>(utxos: Vec<UnspentOutput>, expected: &S) -> Result<Option<UnspentOutput>>
where
    S: ToPlutusData + FromPlutusData + PartialEq,
{
    let expected_hash = expected.to_plutus_data().hash()?;
    for utxo in utxos {
        match &utxo.output.datum {
            OutputDatum::None => continue,
            OutputDatum::Hash(h) => {
                if *h == expected_hash {
                    return Ok(Some(utxo));
                }
            }
            OutputDatum::Inline(_) => {
                if utxo.datum_hash() == Some(expected_hash) {
                    return Ok(Some(utxo));
                }
                match utxo.decode_state::<S>() {
                    Ok(state) if state == *expected => return Ok(Some(utxo)),
                    Ok(_) => {}
                    Err(e) => log::warn!("skipping {}: {e}", utxo.out_ref),
                }
            }
        }
    }
    Ok(None)
}

pub fn filter_by_predicate<S, P>(utxos: Vec<UnspentOutput>, predicate: P) -> Vec<Located<S>>
where
    S: FromPlutusData,
    P: Fn(&S) -> bool,
{
    let mut found = Vec::new();
    for utxo in utxos {
        if matches!(utxo.output.datum, OutputDatum::None) {
            continue;
        }
        match utxo.decode_state::<S>() {
            Ok(state) if predicate(&state) => found.push(Located { utxo, state }),
            Ok(_) => {}
            Err(e) => log::warn!("skipping {}: {e}", utxo.out_ref),
        }
    }
    found
}
