use crate::address::Address;
use crate::auction::action::AuctionAction;
use crate::auction::state::{AuctionState, AuctionStatus};
use crate::contract::CompiledValidator;
use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::ledger::{TxOutput, UnspentOutput, Value};
use crate::plutus::ToPlutusData;
use crate::tx::TxDraft;

/// Parameters for settling an auction after its deadline.
pub struct EndParams {
    /// Output located by the live STARTED state.
    pub current: UnspentOutput,
    pub state: AuctionState,
    pub caller: KeyHash,
    pub seller_address: Address,
    pub now_ms: u64,
}

/// STARTED → ENDED. The winning bid goes to the seller and nothing continues
/// at the contract address.
pub fn build_end_tx(validator: &CompiledValidator, params: &EndParams) -> Result<TxDraft> {
    let state = &params.state;
    state.ensure_status(AuctionStatus::Started)?;
    if params.caller != state.seller {
        return Err(Error::Authorization(format!(
            "only seller {} may end this auction",
            state.seller
        )));
    }
    if !params.seller_address.is_owned_by(&state.seller) {
        return Err(Error::Authorization(
            "payout address is not the seller's".into(),
        ));
    }
    if params.now_ms < state.deadline {
        return Err(Error::Timing(format!(
            "auction runs until {}, now is {}",
            state.deadline, params.now_ms
        )));
    }

    let slots = validator.network().slot_config();

    let mut draft = TxDraft::new();
    draft
        .spend_script(
            &params.current,
            validator,
            AuctionAction::end().to_plutus_data(),
            &state.to_plutus_data(),
        )?
        .pay_to(TxOutput::new(
            params.seller_address.clone(),
            Value::lovelace(state.highest_bid),
        ))
        .require_signer(state.seller)
        .valid_from_slot(slots.posix_to_slot_ceil(state.deadline));
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{auction_validator, locked_output, wallet_address};

    fn params(now_ms: u64, caller: u8) -> EndParams {
        let state = AuctionState::deployed(KeyHash([1; 28]), "Painting#1", 1_700_000_000_000)
            .started(100_000_000)
            .outbid_by(KeyHash([2; 28]), 150_000_000)
            .0;
        EndParams {
            current: locked_output(&auction_validator(), 5, 150_000_000, &state),
            state,
            caller: KeyHash([caller; 28]),
            seller_address: wallet_address(caller),
            now_ms,
        }
    }

    #[test]
    fn pays_winning_bid_to_seller_after_deadline() {
        let validator = auction_validator();
        let draft = build_end_tx(&validator, &params(1_700_000_000_000, 1)).unwrap();
        assert_eq!(draft.outputs().len(), 1);
        assert_eq!(draft.outputs()[0].value.coin, 150_000_000);
        assert!(!draft.outputs()[0].address.is_script());
        let expected_from = validator
            .network()
            .slot_config()
            .posix_to_slot_ceil(1_700_000_000_000);
        assert_eq!(draft.validity(), (Some(expected_from), None));
    }

    #[test]
    fn before_deadline_is_a_timing_error() {
        let err = build_end_tx(&auction_validator(), &params(1_699_999_999_999, 1)).unwrap_err();
        assert!(matches!(err, Error::Timing(_)));
    }

    #[test]
    fn non_seller_cannot_end() {
        let err = build_end_tx(&auction_validator(), &params(1_700_000_000_000, 2)).unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }
}
