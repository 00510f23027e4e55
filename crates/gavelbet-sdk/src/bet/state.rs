use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::plutus::{FromPlutusData, PlutusData, ToPlutusData};

/// Datum of a bet output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BetState {
    pub oracle: KeyHash,
    /// Stake of each player, in lovelace.
    pub wager: u64,
    pub player1: KeyHash,
    pub player2: KeyHash,
    /// POSIX milliseconds.
    pub deadline: u64,
    pub is_joined: bool,
}

impl BetState {
    pub fn new(oracle: KeyHash, wager: u64, player1: KeyHash, player2: KeyHash, deadline: u64) -> Self {
        Self {
            oracle,
            wager,
            player1,
            player2,
            deadline,
            is_joined: false,
        }
    }

    pub fn joined(&self) -> Self {
        Self {
            is_joined: true,
            ..self.clone()
        }
    }

    /// Both stakes together.
    pub fn pot(&self) -> Result<u64> {
        self.wager.checked_mul(2).ok_or(Error::ValueOverflow)
    }

    pub fn is_player(&self, key: &KeyHash) -> bool {
        *key == self.player1 || *key == self.player2
    }
}

impl ToPlutusData for BetState {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::bytes(self.oracle),
                PlutusData::integer(self.wager),
                PlutusData::bytes(self.player1),
                PlutusData::bytes(self.player2),
                PlutusData::integer(self.deadline),
                PlutusData::unit(u64::from(self.is_joined)),
            ],
        )
    }
}

impl FromPlutusData for BetState {
    fn from_plutus_data(data: &PlutusData) -> Result<Self> {
        let f = data.expect_constr(0, 6)?;
        let is_joined = match f[5].as_unit()? {
            0 => false,
            1 => true,
            other => return Err(Error::Encoding(format!("invalid boolean constructor {other}"))),
        };
        Ok(Self {
            oracle: f[0].as_key_hash()?,
            wager: f[1].as_u64()?,
            player1: f[2].as_key_hash()?,
            player2: f[3].as_key_hash()?,
            deadline: f[4].as_u64()?,
            is_joined,
        })
    }
}
