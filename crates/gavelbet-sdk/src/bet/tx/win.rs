use rand::Rng;

use crate::address::Address;
use crate::bet::action::BetAction;
use crate::bet::state::BetState;
use crate::contract::CompiledValidator;
use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::ledger::{TxOutput, UnspentOutput, Value};
use crate::plutus::ToPlutusData;
use crate::tx::TxDraft;

/// Parameters for the oracle's settlement.
pub struct WinParams {
    /// Output located by the joined state.
    pub current: UnspentOutput,
    pub state: BetState,
    pub caller: KeyHash,
    pub winner: KeyHash,
    pub winner_address: Address,
}

/// Uniformly choose one of the two players.
pub fn pick_winner<R: Rng + ?Sized>(state: &BetState, rng: &mut R) -> KeyHash {
    if rng.gen_bool(0.5) {
        state.player1
    } else {
        state.player2
    }
}

/// joined → (spent). Everything locked goes to the declared winner; the
/// oracle signs.
pub fn build_win_tx(validator: &CompiledValidator, params: &WinParams) -> Result<TxDraft> {
    let state = &params.state;
    if !state.is_joined {
        return Err(Error::BetNotJoined);
    }
    if params.caller != state.oracle {
        return Err(Error::Authorization(format!(
            "only oracle {} may settle this bet",
            state.oracle
        )));
    }
    if !state.is_player(&params.winner) {
        return Err(Error::Authorization(format!(
            "{} is not a player in this bet",
            params.winner
        )));
    }
    if !params.winner_address.is_owned_by(&params.winner) {
        return Err(Error::Authorization(
            "payout address is not controlled by the winner".into(),
        ));
    }

    let mut draft = TxDraft::new();
    draft
        .spend_script(
            &params.current,
            validator,
            BetAction::win(params.winner).to_plutus_data(),
            &state.to_plutus_data(),
        )?
        .pay_to(TxOutput::new(
            params.winner_address.clone(),
            Value::lovelace(params.current.coin()),
        ))
        .require_signer(state.oracle);
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::testing::{bet_validator, locked_output, wallet_address};

    fn joined() -> BetState {
        BetState::new(KeyHash([9; 28]), 1_000_000, KeyHash([1; 28]), KeyHash([2; 28]), 10_000)
            .joined()
    }

    fn params(state: BetState, caller: u8, winner: u8) -> WinParams {
        WinParams {
            current: locked_output(&bet_validator(), 2, 2_000_000, &state),
            state,
            caller: KeyHash([caller; 28]),
            winner: KeyHash([winner; 28]),
            winner_address: wallet_address(winner),
        }
    }

    #[test]
    fn pays_full_pot_to_winner() {
        let draft = build_win_tx(&bet_validator(), &params(joined(), 9, 2)).unwrap();
        assert_eq!(draft.outputs().len(), 1);
        assert_eq!(draft.outputs()[0].value.coin, 2_000_000);
        assert_eq!(draft.outputs()[0].address, wallet_address(2));
        assert_eq!(draft.required_signers(), &[KeyHash([9; 28])]);
    }

    #[test]
    fn checks_roles() {
        let v = bet_validator();
        assert!(matches!(
            build_win_tx(&v, &params(joined(), 1, 1)),
            Err(Error::Authorization(_))
        ));
        assert!(matches!(
            build_win_tx(&v, &params(joined(), 9, 3)),
            Err(Error::Authorization(_))
        ));
        let open = BetState {
            is_joined: false,
            ..joined()
        };
        assert!(matches!(build_win_tx(&v, &params(open, 9, 1)), Err(Error::BetNotJoined)));
    }

    #[test]
    fn picks_only_players() {
        let state = joined();
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let w = pick_winner(&state, &mut rng);
            assert!(state.is_player(&w));
            seen.insert(w);
        }
        assert_eq!(seen.len(), 2);
    }
}
