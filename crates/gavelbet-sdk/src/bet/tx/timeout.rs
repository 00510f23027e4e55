use crate::address::Address;
use crate::bet::action::BetAction;
use crate::bet::state::BetState;
use crate::contract::CompiledValidator;
use crate::error::{Error, Result};
use crate::ledger::{TxOutput, UnspentOutput, Value};
use crate::plutus::ToPlutusData;
use crate::tx::TxDraft;

/// Parameters for refunding an unsettled bet.
pub struct TimeoutParams {
    /// Output located by the joined state.
    pub current: UnspentOutput,
    pub state: BetState,
    pub player1_address: Address,
    pub player2_address: Address,
    pub now_ms: u64,
}

/// joined → (spent) after the deadline. Each player gets their wager back.
pub fn build_timeout_tx(validator: &CompiledValidator, params: &TimeoutParams) -> Result<TxDraft> {
    let state = &params.state;
    if params.now_ms < state.deadline {
        return Err(Error::Timing(format!(
            "bet runs until {}, now is {}",
            state.deadline, params.now_ms
        )));
    }
    if !state.is_joined {
        return Err(Error::BetNotJoined);
    }
    if !params.player1_address.is_owned_by(&state.player1)
        || !params.player2_address.is_owned_by(&state.player2)
    {
        return Err(Error::Authorization(
            "refund addresses do not belong to the players".into(),
        ));
    }

    let slots = validator.network().slot_config();

    let mut draft = TxDraft::new();
    draft
        .spend_script(
            &params.current,
            validator,
            BetAction::timeout().to_plutus_data(),
            &state.to_plutus_data(),
        )?
        .pay_to(TxOutput::new(
            params.player1_address.clone(),
            Value::lovelace(state.wager),
        ))
        .pay_to(TxOutput::new(
            params.player2_address.clone(),
            Value::lovelace(state.wager),
        ))
        .require_signer(state.player1)
        .require_signer(state.player2)
        .valid_from_slot(slots.posix_to_slot_ceil(state.deadline));
    Ok(draft)
}
