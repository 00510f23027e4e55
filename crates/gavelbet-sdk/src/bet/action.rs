use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::plutus::{FromPlutusData, PlutusData, ToPlutusData};

/// Redeemer of the bet validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetAction {
    /// Second player matches the wager.
    Join { wager: u64 },
    /// Oracle declares the winner.
    Win { winner: KeyHash },
    /// Refund after the deadline.
    Timeout,
}

impl BetAction {
    pub fn join(wager: u64) -> Self {
        Self::Join { wager }
    }

    pub fn win(winner: KeyHash) -> Self {
        Self::Win { winner }
    }

    pub fn timeout() -> Self {
        Self::Timeout
    }
}

impl ToPlutusData for BetAction {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            Self::Join { wager } => PlutusData::constr(0, vec![PlutusData::integer(*wager)]),
            Self::Win { winner } => PlutusData::constr(1, vec![PlutusData::bytes(winner)]),
            Self::Timeout => PlutusData::unit(2),
        }
    }
}

impl FromPlutusData for BetAction {
    fn from_plutus_data(data: &PlutusData) -> Result<Self> {
        match data {
            PlutusData::Constr { alternative: 0, .. } => {
                let f = data.expect_constr(0, 1)?;
                Ok(Self::Join {
                    wager: f[0].as_u64()?,
                })
            }
            PlutusData::Constr { alternative: 1, .. } => {
                let f = data.expect_constr(1, 1)?;
                Ok(Self::Win {
                    winner: f[0].as_key_hash()?,
                })
            }
            PlutusData::Constr { alternative: 2, .. } => {
                data.expect_constr(2, 0)?;
                Ok(Self::Timeout)
            }
            other => Err(Error::Encoding(format!("unknown bet action {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodings() {
        assert_eq!(
            hex::encode(BetAction::join(1_000_000).to_plutus_data().to_cbor().unwrap()),
            "d8799f1a000f4240ff"
        );
        assert_eq!(
            hex::encode(BetAction::timeout().to_plutus_data().to_cbor().unwrap()),
            "d87b80"
        );
        let win = BetAction::win(KeyHash([7; 28]));
        let cbor = win.to_plutus_data().to_cbor().unwrap();
        assert!(hex::encode(&cbor).starts_with("d87a9f581c07"));
        assert_eq!(
            BetAction::from_plutus_data(&PlutusData::from_cbor(&cbor).unwrap()).unwrap(),
            win
        );
    }

    #[test]
    fn wrong_arity_rejected() {
        assert!(BetAction::from_plutus_data(&PlutusData::unit(0)).is_err());
        assert!(BetAction::from_plutus_data(&PlutusData::unit(3)).is_err());
    }
}
