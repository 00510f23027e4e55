use crate::bet::state::BetState;
use crate::contract::CompiledValidator;
use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::ledger::{TxOutput, Value};
use crate::params::MIN_DEPOSIT;
use crate::plutus::ToPlutusData;
use crate::tx::TxDraft;

/// Parameters for opening a bet between two players.
pub struct DeployBetParams {
    pub oracle: KeyHash,
    pub player1: KeyHash,
    pub player2: KeyHash,
    pub wager: u64,
    /// POSIX milliseconds.
    pub deadline: u64,
    pub now_ms: u64,
}

/// Lock [`MIN_DEPOSIT`] at the bet address under a not-joined state.
pub fn build_deploy_bet_tx(
    validator: &CompiledValidator,
    params: &DeployBetParams,
) -> Result<(TxDraft, BetState)> {
    if params.wager == 0 {
        return Err(Error::ZeroAmount);
    }
    if params.player1 == params.player2 {
        return Err(Error::Authorization("a bet needs two distinct players".into()));
    }
    if params.deadline <= params.now_ms {
        return Err(Error::Timing(format!(
            "deadline {} is not in the future",
            params.deadline
        )));
    }

    let state = BetState::new(
        params.oracle,
        params.wager,
        params.player1,
        params.player2,
        params.deadline,
    );

    let mut draft = TxDraft::new();
    draft.pay_to(TxOutput::with_inline_datum(
        validator.address().clone(),
        Value::lovelace(MIN_DEPOSIT),
        &state.to_plutus_data(),
    )?);
    Ok((draft, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::bet_validator;

    fn params() -> DeployBetParams {
        DeployBetParams {
            oracle: KeyHash([9; 28]),
            player1: KeyHash([1; 28]),
            player2: KeyHash([2; 28]),
            wager: 1_000_000,
            deadline: 10_000,
            now_ms: 0,
        }
    }

    #[test]
    fn records_wager_and_deadline() {
        let validator = bet_validator();
        let (draft, state) = build_deploy_bet_tx(&validator, &params()).unwrap();
        assert!(!state.is_joined);
        assert_eq!(state.wager, 1_000_000);
        assert_eq!(state.deadline, 10_000);
        assert_eq!(draft.outputs()[0].value.coin, MIN_DEPOSIT);
        assert_eq!(&draft.outputs()[0].address, validator.address());
    }

    #[test]
    fn rejects_degenerate_bets() {
        let validator = bet_validator();
        let zero = DeployBetParams { wager: 0, ..params() };
        assert!(matches!(build_deploy_bet_tx(&validator, &zero), Err(Error::ZeroAmount)));
        let solo = DeployBetParams {
            player2: KeyHash([1; 28]),
            ..params()
        };
        assert!(build_deploy_bet_tx(&validator, &solo).is_err());
    }
}
