use crate::address::Address;
use crate::auction::action::AuctionAction;
use crate::auction::state::{AuctionState, AuctionStatus};
use crate::contract::CompiledValidator;
use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::ledger::{TxOutput, UnspentOutput, Value};
use crate::plutus::ToPlutusData;
use crate::tx::TxDraft;

/// Parameters for reclaiming a superseded bid.
pub struct WithdrawParams {
    /// Output located by the OUTBID state.
    pub current: UnspentOutput,
    pub state: AuctionState,
    pub caller: KeyHash,
    pub payout_address: Address,
}

/// OUTBID → (spent). Pays the superseded bid back to its bidder.
pub fn build_withdraw_tx(validator: &CompiledValidator, params: &WithdrawParams) -> Result<TxDraft> {
    let state = &params.state;
    state.ensure_status(AuctionStatus::Outbid)?;
    if params.caller != state.highest_bidder {
        return Err(Error::Authorization(format!(
            "bid belongs to {}, not {}",
            state.highest_bidder, params.caller
        )));
    }
    if !params.payout_address.is_owned_by(&params.caller) {
        return Err(Error::Authorization(
            "payout address is not controlled by the withdrawing bidder".into(),
        ));
    }

    let mut draft = TxDraft::new();
    draft
        .spend_script(
            &params.current,
            validator,
            AuctionAction::withdraw().to_plutus_data(),
            &state.to_plutus_data(),
        )?
        .pay_to(TxOutput::new(
            params.payout_address.clone(),
            Value::lovelace(state.highest_bid),
        ))
        .require_signer(params.caller);
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{auction_validator, locked_output, wallet_address};

    fn outbid() -> AuctionState {
        let started =
            AuctionState::deployed(KeyHash([1; 28]), "Painting#1", 5_000_000).started(100_000_000);
        started.outbid_by(KeyHash([2; 28]), 150_000_000).1
    }

    fn params(state: AuctionState, caller: u8) -> WithdrawParams {
        WithdrawParams {
            current: locked_output(&auction_validator(), 4, state.highest_bid, &state),
            state,
            caller: KeyHash([caller; 28]),
            payout_address: wallet_address(caller),
        }
    }

    #[test]
    fn pays_superseded_bid_to_bidder() {
        // The superseded state still names the seller's opening bid.
        let draft = build_withdraw_tx(&auction_validator(), &params(outbid(), 1)).unwrap();
        assert_eq!(draft.outputs().len(), 1);
        assert_eq!(draft.outputs()[0].value.coin, 100_000_000);
        assert_eq!(draft.outputs()[0].address, wallet_address(1));
        assert_eq!(draft.required_signers(), &[KeyHash([1; 28])]);
    }

    #[test]
    fn only_outbid_outputs_can_be_withdrawn() {
        let started =
            AuctionState::deployed(KeyHash([1; 28]), "Painting#1", 5_000_000).started(100_000_000);
        let err = build_withdraw_tx(&auction_validator(), &params(started, 1)).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidAuctionStatus {
                expected: AuctionStatus::Outbid,
                ..
            }
        ));
    }

    #[test]
    fn someone_else_cannot_withdraw() {
        let err = build_withdraw_tx(&auction_validator(), &params(outbid(), 3)).unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }
}
