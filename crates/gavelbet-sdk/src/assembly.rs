//! Turn an action draft into a balanced, fee-correct unsigned transaction.
//!
//! The draft carries the contract-specific inputs and outputs. Finalization
//! adds wallet inputs for the deficit, collateral for script execution, the
//! witness set, the script data hash, the fee and a change output.

use crate::address::Address;
use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::ledger::{OutputRef, TxOutput, UnspentOutput, Value};
use crate::network::Network;
use crate::params::{BuildConfig, ExUnits, ProtocolParams};
use crate::plutus::PlutusData;
use crate::tx::wire::output_size;
use crate::tx::{
    FeeBreakdown, Redeemer, RedeemerTag, Transaction, TxBody, TxDraft, UnsignedTransaction,
    VKeyWitness, WitnessSet,
};

const MAX_FEE_ITERATIONS: usize = 10;

/// Collateral outputs at least this large are preferred, smallest first.
const PREFERRED_COLLATERAL: u64 = 5_000_000;

/// Everything finalization needs besides the draft itself.
pub struct FinalizeInputs<'a> {
    pub wallet_utxos: &'a [UnspentOutput],
    pub change_address: &'a Address,
    pub protocol_params: &'a ProtocolParams,
    pub build_config: &'a BuildConfig,
    pub network: Network,
    /// Build time in POSIX milliseconds, used for the default validity window.
    pub now_ms: u64,
}

struct InputPlan<'u> {
    wallet_inputs: Vec<&'u UnspentOutput>,
    change: Option<TxOutput>,
    /// Fee written to the body; exceeds the target when dust change is folded in.
    fee_paid: u64,
}

/// Balance `draft` against the wallet and compute its fee.
pub fn finalize(draft: &TxDraft, inputs: &FinalizeInputs<'_>) -> Result<UnsignedTransaction> {
    let pp = inputs.protocol_params;

    // A. Action outputs must stand on their own
    for output in draft.outputs() {
        check_min_utxo(pp, output)?;
    }
    let outputs_total = sum_values(draft.outputs().iter().map(|o| &o.value))?;
    let script_total = sum_values(draft.script_inputs().iter().map(|s| &s.utxo.output.value))?;

    // B. Execution budget
    let budget = inputs.build_config.redeemer_budget;
    let scripts = draft.script_inputs().len() as u64;
    let total_ex = ExUnits::new(
        budget.mem.checked_mul(scripts).ok_or(Error::ValueOverflow)?,
        budget.steps.checked_mul(scripts).ok_or(Error::ValueOverflow)?,
    );
    if !total_ex.fits_within(pp.max_tx_ex_units) {
        return Err(Error::ExecutionBudget(format!(
            "{scripts} redeemers need {total_ex:?}, limit is {:?}",
            pp.max_tx_ex_units
        )));
    }
    let execution_fee = pp.execution_fee(total_ex)?;

    // C. Validity interval
    let (valid_from, valid_until) = draft.validity();
    let ttl = match valid_until {
        Some(slot) => slot,
        None => {
            let window = inputs.build_config.validity_window.as_millis() as u64;
            inputs
                .network
                .slot_config()
                .posix_to_slot(inputs.now_ms.saturating_add(window))
        }
    };
    if let Some(from) = valid_from {
        if from >= ttl {
            return Err(Error::Timing(format!(
                "validity interval [{from}, {ttl}) is empty"
            )));
        }
    }

    // D. Collateral, only when scripts run
    let collateral = if draft.script_inputs().is_empty() {
        None
    } else {
        Some(pick_collateral(inputs.wallet_utxos)?)
    };

    // E. Wallet candidates, largest first
    let mut candidates: Vec<&UnspentOutput> = inputs
        .wallet_utxos
        .iter()
        .filter(|u| {
            !draft
                .script_inputs()
                .iter()
                .any(|s| s.utxo.out_ref == u.out_ref)
        })
        .collect();
    candidates.sort_by(|a, b| b.coin().cmp(&a.coin()).then(a.out_ref.cmp(&b.out_ref)));

    // F. Iterate until the fee covers the transaction it is part of
    let mut fee = pp.min_fee_b;
    for _ in 0..MAX_FEE_ITERATIONS {
        let plan = plan_inputs(
            &candidates,
            &script_total,
            &outputs_total,
            fee,
            pp,
            inputs.change_address,
        )?;
        let (tx, signers) = assemble(draft, &plan, collateral, ttl, valid_from, pp, budget)?;

        let size = signed_size(&tx, signers.len())?;
        if size > pp.max_tx_size {
            return Err(Error::Balancing(format!(
                "transaction of {size} bytes exceeds the {} byte limit",
                pp.max_tx_size
            )));
        }
        let size_fee = pp
            .min_fee_a
            .checked_mul(size)
            .and_then(|v| v.checked_add(pp.min_fee_b))
            .ok_or(Error::ValueOverflow)?;
        let min_fee = size_fee
            .checked_add(execution_fee)
            .ok_or(Error::ValueOverflow)?;

        if plan.fee_paid >= min_fee {
            let tx_id = tx.id();
            let bytes = tx.to_bytes()?;
            log::debug!(
                "finalized {tx_id}: {} inputs, {} outputs, fee {} ({size} bytes)",
                tx.body().inputs.len(),
                tx.body().outputs.len(),
                plan.fee_paid
            );
            return Ok(UnsignedTransaction::new(
                bytes,
                tx_id,
                signers,
                FeeBreakdown {
                    size_bytes: size,
                    size_fee,
                    execution_fee,
                    total: plan.fee_paid,
                },
            ));
        }
        fee = min_fee;
    }

    Err(Error::Balancing(format!(
        "fee did not converge after {MAX_FEE_ITERATIONS} iterations"
    )))
}

/// Pure-lovelace output at a key address: the smallest holding at least
/// [`PREFERRED_COLLATERAL`], otherwise the largest available.
pub fn pick_collateral(wallet_utxos: &[UnspentOutput]) -> Result<&UnspentOutput> {
    let eligible = || {
        wallet_utxos
            .iter()
            .filter(|u| u.output.address.payment_key_hash().is_some() && !u.output.value.has_assets())
    };
    eligible()
        .filter(|u| u.coin() >= PREFERRED_COLLATERAL)
        .min_by_key(|u| (u.coin(), u.out_ref))
        .or_else(|| eligible().max_by_key(|u| u.coin()))
        .ok_or(Error::NoCollateral)
}

fn plan_inputs<'u>(
    candidates: &[&'u UnspentOutput],
    script_total: &Value,
    outputs_total: &Value,
    fee: u64,
    pp: &ProtocolParams,
    change_address: &Address,
) -> Result<InputPlan<'u>> {
    let need = outputs_total.checked_add(&Value::lovelace(fee))?;
    let selected = select_covering(candidates, script_total, &need)?;
    let change = change_value(script_total, &selected, &need)?;
    if is_empty(&change) {
        return Ok(InputPlan {
            wallet_inputs: selected,
            change: None,
            fee_paid: fee,
        });
    }

    let change_out = TxOutput::new(change_address.clone(), change.clone());
    let min_change = pp.min_utxo_lovelace(output_size(&change_out)?);
    if change.coin >= min_change {
        return Ok(InputPlan {
            wallet_inputs: selected,
            change: Some(change_out),
            fee_paid: fee,
        });
    }

    // Change too small for its own output: pull in more, or give it to the fee.
    let bumped = need.checked_add(&Value::lovelace(min_change))?;
    match select_covering(candidates, script_total, &bumped) {
        Ok(selected) => {
            let change = change_value(script_total, &selected, &need)?;
            let change_out = TxOutput::new(change_address.clone(), change);
            check_min_utxo(pp, &change_out)?;
            Ok(InputPlan {
                wallet_inputs: selected,
                change: Some(change_out),
                fee_paid: fee,
            })
        }
        Err(_) if !change.has_assets() => {
            log::debug!("folding {} lovelace of dust change into the fee", change.coin);
            Ok(InputPlan {
                wallet_inputs: selected,
                change: None,
                fee_paid: fee.checked_add(change.coin).ok_or(Error::ValueOverflow)?,
            })
        }
        Err(e) => Err(e),
    }
}

/// Smallest largest-first prefix of `candidates` that, with the script
/// inputs, covers `need`. Once lovelace is covered only outputs holding a
/// still-missing asset are taken.
fn select_covering<'u>(
    candidates: &[&'u UnspentOutput],
    script_total: &Value,
    need: &Value,
) -> Result<Vec<&'u UnspentOutput>> {
    let mut selected = Vec::new();
    let mut total = script_total.clone();
    for utxo in candidates {
        // A transaction needs at least one input.
        if total.covers(need) && !(selected.is_empty() && is_empty(script_total)) {
            break;
        }
        let helps = total.coin < need.coin
            || holds_any(&utxo.output.value, &total.missing_assets(need))
            || (selected.is_empty() && is_empty(script_total));
        if !helps {
            continue;
        }
        total = total.checked_add(&utxo.output.value)?;
        selected.push(*utxo);
    }
    if !total.covers(need) {
        let missing = total.missing_assets(need);
        return Err(Error::InsufficientFunds(format!(
            "need {} lovelace{}, inputs provide {}",
            need.coin,
            if missing.has_assets() {
                " plus native assets"
            } else {
                ""
            },
            total.coin
        )));
    }
    Ok(selected)
}

fn change_value(script_total: &Value, selected: &[&UnspentOutput], need: &Value) -> Result<Value> {
    let total_in = selected
        .iter()
        .try_fold(script_total.clone(), |acc, u| acc.checked_add(&u.output.value))?;
    total_in
        .checked_sub(need)
        .ok_or_else(|| Error::Balancing("selected inputs do not cover outputs".into()))
}

fn assemble(
    draft: &TxDraft,
    plan: &InputPlan<'_>,
    collateral: Option<&UnspentOutput>,
    ttl: u64,
    valid_from: Option<u64>,
    pp: &ProtocolParams,
    budget: ExUnits,
) -> Result<(Transaction, Vec<KeyHash>)> {
    let mut inputs: Vec<OutputRef> = draft
        .script_inputs()
        .iter()
        .map(|s| s.utxo.out_ref)
        .chain(plan.wallet_inputs.iter().map(|u| u.out_ref))
        .collect();
    inputs.sort();
    inputs.dedup();

    // Redeemers point into the sorted input list.
    let mut redeemers = Vec::with_capacity(draft.script_inputs().len());
    let mut scripts: Vec<Vec<u8>> = Vec::new();
    let mut datums: Vec<PlutusData> = Vec::new();
    for input in draft.script_inputs() {
        let index = inputs
            .binary_search(&input.utxo.out_ref)
            .map_err(|_| Error::Balancing(format!("script input {} not in input set", input.utxo.out_ref)))?;
        redeemers.push(Redeemer {
            tag: RedeemerTag::Spend,
            index: index as u32,
            data: input.redeemer.clone(),
            ex_units: budget,
        });
        if !scripts.contains(&input.script_bytes) {
            scripts.push(input.script_bytes.clone());
        }
        if let Some(datum) = &input.witness_datum {
            if !datums.contains(datum) {
                datums.push(datum.clone());
            }
        }
    }
    redeemers.sort_by_key(|r| r.index);

    let mut witnesses = WitnessSet::default();
    witnesses.set_plutus_v3_scripts(&scripts)?;
    witnesses.set_redeemers(&redeemers)?;
    witnesses.set_plutus_data(&datums)?;
    let script_data_hash = witnesses.script_data_hash(&pp.plutus_v3_cost_model)?;

    let mut outputs = draft.outputs().to_vec();
    if let Some(change) = &plan.change {
        outputs.push(change.clone());
    }

    let mut body = TxBody {
        inputs,
        outputs,
        fee: plan.fee_paid,
        ttl: Some(ttl),
        validity_start: valid_from,
        script_data_hash,
        required_signers: draft.required_signers().to_vec(),
        ..Default::default()
    };

    if let Some(coll) = collateral {
        let required = pp.required_collateral(plan.fee_paid)?;
        if coll.coin() < required {
            return Err(Error::InsufficientFunds(format!(
                "collateral output {} holds {} lovelace, {required} required",
                coll.out_ref,
                coll.coin()
            )));
        }
        let ret = TxOutput::new(coll.output.address.clone(), Value::lovelace(coll.coin() - required));
        body.collateral = vec![coll.out_ref];
        if ret.value.coin >= pp.min_utxo_lovelace(output_size(&ret)?) {
            body.collateral_return = Some(ret);
            body.total_collateral = Some(required);
        } else {
            body.total_collateral = Some(coll.coin());
        }
    }

    let mut signers = draft.required_signers().to_vec();
    for owner in plan
        .wallet_inputs
        .iter()
        .copied()
        .chain(collateral)
        .filter_map(|u| u.output.address.payment_key_hash())
    {
        if !signers.contains(&owner) {
            signers.push(owner);
        }
    }

    Ok((Transaction::new(body, witnesses)?, signers))
}

/// Size once `signers` vkey witnesses are attached.
fn signed_size(tx: &Transaction, signers: usize) -> Result<u64> {
    let mut sized = tx.clone();
    for i in 0..signers {
        let mut vkey = [0u8; 32];
        vkey[..8].copy_from_slice(&(i as u64).to_be_bytes());
        sized.witnesses.add_vkey_witness(VKeyWitness {
            vkey,
            signature: [0; 64],
        });
    }
    Ok(sized.to_bytes()?.len() as u64)
}

fn check_min_utxo(pp: &ProtocolParams, output: &TxOutput) -> Result<()> {
    let required = pp.min_utxo_lovelace(output_size(output)?);
    if output.value.coin < required {
        return Err(Error::BelowMinUtxo {
            required,
            actual: output.value.coin,
        });
    }
    Ok(())
}

fn sum_values<'v>(mut values: impl Iterator<Item = &'v Value>) -> Result<Value> {
    values.try_fold(Value::default(), |acc, v| acc.checked_add(v))
}

fn holds_any(value: &Value, wanted: &Value) -> bool {
    wanted.assets.iter().any(|(policy, names)| {
        names.keys().any(|name| {
            value
                .assets
                .get(policy)
                .and_then(|n| n.get(name))
                .is_some_and(|q| *q > 0)
        })
    })
}

fn is_empty(value: &Value) -> bool {
    value.coin == 0 && !value.has_assets()
}
