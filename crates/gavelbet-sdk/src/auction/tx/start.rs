use crate::address::Address;
use crate::auction::action::AuctionAction;
use crate::auction::state::{AuctionState, AuctionStatus};
use crate::contract::CompiledValidator;
use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::ledger::{TxOutput, UnspentOutput, Value};
use crate::params::MIN_DEPOSIT;
use crate::plutus::ToPlutusData;
use crate::tx::TxDraft;

/// Parameters for opening the bidding on a deployed auction.
pub struct StartParams {
    /// Output located by the deployed state.
    pub current: UnspentOutput,
    pub state: AuctionState,
    pub caller: KeyHash,
    pub starting_bid: u64,
    /// Receives the deploy-time deposit back.
    pub seller_address: Address,
    pub now_ms: u64,
}

/// NOT_STARTED → STARTED. The seller locks the starting bid and gets the
/// deposit back.
pub fn build_start_tx(validator: &CompiledValidator, params: &StartParams) -> Result<TxDraft> {
    let state = &params.state;
    state.ensure_status(AuctionStatus::NotStarted)?;
    if params.caller != state.seller {
        return Err(Error::Authorization(format!(
            "only seller {} may start this auction",
            state.seller
        )));
    }
    if !params.seller_address.is_owned_by(&state.seller) {
        return Err(Error::Authorization(
            "deposit return address is not the seller's".into(),
        ));
    }
    if params.starting_bid == 0 {
        return Err(Error::ZeroAmount);
    }
    if params.now_ms >= state.deadline {
        return Err(Error::Timing("auction deadline has passed".into()));
    }

    let next = state.started(params.starting_bid);
    let slots = validator.network().slot_config();

    let mut draft = TxDraft::new();
    draft
        // Input 0: deployed auction output
        .spend_script(
            &params.current,
            validator,
            AuctionAction::start().to_plutus_data(),
            &state.to_plutus_data(),
        )?
        // Output 0: started auction holding the opening bid
        .pay_to(TxOutput::with_inline_datum(
            validator.address().clone(),
            Value::lovelace(params.starting_bid),
            &next.to_plutus_data(),
        )?)
        // Output 1: deposit back to the seller
        .pay_to(TxOutput::new(
            params.seller_address.clone(),
            Value::lovelace(MIN_DEPOSIT),
        ))
        .require_signer(state.seller)
        .valid_until_slot(slots.posix_to_slot(state.deadline));
    Ok(draft)
}
