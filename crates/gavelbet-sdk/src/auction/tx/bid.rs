use crate::auction::action::AuctionAction;
use crate::auction::state::{AuctionState, AuctionStatus};
use crate::contract::CompiledValidator;
use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::ledger::{TxOutput, UnspentOutput, Value};
use crate::plutus::ToPlutusData;
use crate::tx::TxDraft;

/// Parameters for outbidding the current highest bid.
pub struct BidParams {
    /// Output located by the current STARTED state.
    pub current: UnspentOutput,
    pub state: AuctionState,
    pub bidder: KeyHash,
    pub amount: u64,
    pub now_ms: u64,
}

/// Local validation of a bid against the last known state. Needs no network
/// access, so callers run it before locating anything.
pub fn check_bid(state: &AuctionState, amount: u64, now_ms: u64) -> Result<()> {
    state.ensure_status(AuctionStatus::Started)?;
    if amount == 0 {
        return Err(Error::ZeroAmount);
    }
    if amount <= state.highest_bid {
        return Err(Error::BidTooLow {
            bid: amount,
            highest: state.highest_bid,
        });
    }
    if now_ms >= state.deadline {
        return Err(Error::Timing("bidding closed at the auction deadline".into()));
    }
    Ok(())
}

/// STARTED → STARTED with a new highest bidder. The superseded bid stays at
/// the contract under an OUTBID state until its bidder withdraws it.
pub fn build_bid_tx(validator: &CompiledValidator, params: &BidParams) -> Result<TxDraft> {
    let state = &params.state;
    check_bid(state, params.amount, params.now_ms)?;

    let (next, superseded) = state.outbid_by(params.bidder, params.amount);
    let slots = validator.network().slot_config();

    let mut draft = TxDraft::new();
    draft
        // Input 0: live auction output
        .spend_script(
            &params.current,
            validator,
            AuctionAction::bid().to_plutus_data(),
            &state.to_plutus_data(),
        )?
        // Output 0: live auction holding the new bid
        .pay_to(TxOutput::with_inline_datum(
            validator.address().clone(),
            Value::lovelace(params.amount),
            &next.to_plutus_data(),
        )?)
        // Output 1: previous bid, withdrawable by its bidder
        .pay_to(TxOutput::with_inline_datum(
            validator.address().clone(),
            Value::lovelace(state.highest_bid),
            &superseded.to_plutus_data(),
        )?)
        .require_signer(params.bidder)
        .valid_until_slot(slots.posix_to_slot(state.deadline));
    Ok(draft)
}
