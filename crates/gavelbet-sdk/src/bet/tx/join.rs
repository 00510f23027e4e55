use crate::address::Address;
use crate::bet::action::BetAction;
use crate::bet::state::BetState;
use crate::contract::CompiledValidator;
use crate::error::{Error, Result};
use crate::ledger::{TxOutput, UnspentOutput, Value};
use crate::params::MIN_DEPOSIT;
use crate::plutus::ToPlutusData;
use crate::tx::TxDraft;

/// Parameters for locking both stakes.
pub struct JoinParams {
    /// Output located by the not-joined state.
    pub current: UnspentOutput,
    pub state: BetState,
    /// Receives the deploy-time deposit back.
    pub deposit_return: Address,
    pub now_ms: u64,
}

/// not joined → joined. The continuing output holds exactly twice the
/// wager; both players must sign.
pub fn build_join_tx(validator: &CompiledValidator, params: &JoinParams) -> Result<TxDraft> {
    let state = &params.state;
    if state.is_joined {
        return Err(Error::BetAlreadyJoined);
    }
    if params.now_ms >= state.deadline {
        return Err(Error::Timing("bet deadline has passed".into()));
    }

    let next = state.joined();
    let slots = validator.network().slot_config();

    let mut draft = TxDraft::new();
    draft
        // Input 0: deployed bet output
        .spend_script(
            &params.current,
            validator,
            BetAction::join(state.wager).to_plutus_data(),
            &state.to_plutus_data(),
        )?
        // Output 0: joined bet holding both stakes
        .pay_to(TxOutput::with_inline_datum(
            validator.address().clone(),
            Value::lovelace(state.pot()?),
            &next.to_plutus_data(),
        )?)
        // Output 1: deposit back to the deployer
        .pay_to(TxOutput::new(
            params.deposit_return.clone(),
            Value::lovelace(MIN_DEPOSIT),
        ))
        .require_signer(state.player1)
        .require_signer(state.player2)
        .valid_until_slot(slots.posix_to_slot(state.deadline));
    Ok(draft)
}
