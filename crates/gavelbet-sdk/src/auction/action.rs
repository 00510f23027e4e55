use crate::error::{Error, Result};
use crate::plutus::{FromPlutusData, PlutusData, ToPlutusData};

/// Redeemer of the auction validator. No variant carries fields: a bid's
/// amount travels in the value of the continuing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionAction {
    Start,
    Bid,
    Withdraw,
    End,
}

impl AuctionAction {
    pub fn start() -> Self {
        Self::Start
    }

    pub fn bid() -> Self {
        Self::Bid
    }

    pub fn withdraw() -> Self {
        Self::Withdraw
    }

    pub fn end() -> Self {
        Self::End
    }

    pub fn alternative(self) -> u64 {
        match self {
            Self::Start => 0,
            Self::Bid => 1,
            Self::Withdraw => 2,
            Self::End => 3,
        }
    }
}

impl ToPlutusData for AuctionAction {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::unit(self.alternative())
    }
}

impl FromPlutusData for AuctionAction {
    fn from_plutus_data(data: &PlutusData) -> Result<Self> {
        match data.as_unit()? {
            0 => Ok(Self::Start),
            1 => Ok(Self::Bid),
            2 => Ok(Self::Withdraw),
            3 => Ok(Self::End),
            other => Err(Error::Encoding(format!("unknown auction action {other}"))),
        }
    }
}
