use crate::auction::state::AuctionState;
use crate::contract::CompiledValidator;
use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::ledger::{TxOutput, Value};
use crate::params::MIN_DEPOSIT;
use crate::plutus::ToPlutusData;
use crate::tx::TxDraft;

/// Parameters for opening a new auction.
pub struct DeployAuctionParams {
    pub seller: KeyHash,
    pub object: Vec<u8>,
    /// POSIX milliseconds.
    pub deadline: u64,
    pub now_ms: u64,
}

/// Lock [`MIN_DEPOSIT`] at the auction address under a NOT_STARTED state.
pub fn build_deploy_auction_tx(
    validator: &CompiledValidator,
    params: &DeployAuctionParams,
) -> Result<(TxDraft, AuctionState)> {
    if params.object.is_empty() {
        return Err(Error::Encoding("auction object identifier is empty".into()));
    }
    if params.deadline <= params.now_ms {
        return Err(Error::Timing(format!(
            "deadline {} is not in the future",
            params.deadline
        )));
    }

    let state = AuctionState::deployed(params.seller, params.object.clone(), params.deadline);

    let mut draft = TxDraft::new();
    draft.pay_to(TxOutput::with_inline_datum(
        validator.address().clone(),
        Value::lovelace(MIN_DEPOSIT),
        &state.to_plutus_data(),
    )?);
    Ok((draft, state))
}
