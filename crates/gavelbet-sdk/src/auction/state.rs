use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::plutus::{FromPlutusData, PlutusData, ToPlutusData};

/// Lifecycle of an auction output. Encoded on chain as a zero-field
/// constructor whose alternative is the discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u64)]
pub enum AuctionStatus {
    /// Deployed with the minimum deposit, no bid yet.
    NotStarted = 0,
    /// Open for bids until the deadline.
    Started = 1,
    /// A superseded bid, waiting for its bidder to withdraw it.
    Outbid = 2,
    /// Settled. Never appears on chain since End leaves no continuing output.
    Ended = 3,
}

impl AuctionStatus {
    pub fn from_u64(v: u64) -> Option<Self> {
        match v {
            0 => Some(Self::NotStarted),
            1 => Some(Self::Started),
            2 => Some(Self::Outbid),
            3 => Some(Self::Ended),
            _ => None,
        }
    }

    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

impl ToPlutusData for AuctionStatus {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::unit(self.as_u64())
    }
}

impl FromPlutusData for AuctionStatus {
    fn from_plutus_data(data: &PlutusData) -> Result<Self> {
        let alt = data.as_unit()?;
        Self::from_u64(alt).ok_or_else(|| Error::Encoding(format!("unknown auction status {alt}")))
    }
}

/// Datum of an auction output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuctionState {
    pub seller: KeyHash,
    /// Identifier of the auctioned object, free-form bytes.
    pub object: Vec<u8>,
    /// POSIX milliseconds.
    pub deadline: u64,
    pub status: AuctionStatus,
    pub highest_bidder: KeyHash,
    pub highest_bid: u64,
}

impl AuctionState {
    /// State locked by Deploy: no bid, the seller standing in as bidder.
    pub fn deployed(seller: KeyHash, object: impl Into<Vec<u8>>, deadline: u64) -> Self {
        Self {
            seller,
            object: object.into(),
            deadline,
            status: AuctionStatus::NotStarted,
            highest_bidder: seller,
            highest_bid: 0,
        }
    }

    /// State produced by Start: the seller's reserve is the opening bid.
    pub fn started(&self, starting_bid: u64) -> Self {
        Self {
            status: AuctionStatus::Started,
            highest_bidder: self.seller,
            highest_bid: starting_bid,
            ..self.clone()
        }
    }

    /// States produced by a Bid: the new live state and the superseded one.
    pub fn outbid_by(&self, bidder: KeyHash, amount: u64) -> (Self, Self) {
        let next = Self {
            status: AuctionStatus::Started,
            highest_bidder: bidder,
            highest_bid: amount,
            ..self.clone()
        };
        let superseded = Self {
            status: AuctionStatus::Outbid,
            ..self.clone()
        };
        (next, superseded)
    }

    /// Object identifier for display.
    pub fn object_label(&self) -> String {
        String::from_utf8_lossy(&self.object).into_owned()
    }

    pub fn ensure_status(&self, expected: AuctionStatus) -> Result<()> {
        if self.status != expected {
            return Err(Error::InvalidAuctionStatus {
                expected,
                found: self.status,
            });
        }
        Ok(())
    }
}

impl ToPlutusData for AuctionState {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::bytes(self.seller),
                PlutusData::bytes(&self.object),
                PlutusData::integer(self.deadline),
                self.status.to_plutus_data(),
                PlutusData::bytes(self.highest_bidder),
                PlutusData::integer(self.highest_bid),
            ],
        )
    }
}

impl FromPlutusData for AuctionState {
    fn from_plutus_data(data: &PlutusData) -> Result<Self> {
        let f = data.expect_constr(0, 6)?;
        Ok(Self {
            seller: f[0].as_key_hash()?,
            object: f[1].as_bytes()?.to_vec(),
            deadline: f[2].as_u64()?,
            status: AuctionStatus::from_plutus_data(&f[3])?,
            highest_bidder: f[4].as_key_hash()?,
            highest_bid: f[5].as_u64()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AuctionState {
        AuctionState::deployed(KeyHash([1; 28]), "Painting#1", 1_700_000_000_000)
    }

    #[test]
    fn status_roundtrip() {
        for v in 0..=3 {
            let status = AuctionStatus::from_u64(v).unwrap();
            assert_eq!(status.as_u64(), v);
            assert_eq!(
                AuctionStatus::from_plutus_data(&status.to_plutus_data()).unwrap(),
                status
            );
        }
        assert!(AuctionStatus::from_u64(4).is_none());
    }

    #[test]
    fn plain_integer_status_is_rejected() {
        let mut data = sample().to_plutus_data();
        if let PlutusData::Constr { fields, .. } = &mut data {
            fields[3] = PlutusData::integer(1);
        }
        assert!(matches!(
            AuctionState::from_plutus_data(&data),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn datum_roundtrip_through_cbor() {
        let state = sample().started(100_000_000);
        let cbor = state.to_plutus_data().to_cbor().unwrap();
        let decoded = AuctionState::from_plutus_data(&PlutusData::from_cbor(&cbor).unwrap()).unwrap();
        assert_eq!(decoded, state);

        let boundary = AuctionState {
            object: vec![0xff; 200],
            highest_bid: 0,
            ..state
        };
        let cbor = boundary.to_plutus_data().to_cbor().unwrap();
        assert_eq!(
            AuctionState::from_plutus_data(&PlutusData::from_cbor(&cbor).unwrap()).unwrap(),
            boundary
        );
    }

    #[test]
    fn deployed_layout() {
        let hex = hex::encode(sample().to_plutus_data().to_cbor().unwrap());
        // Constr0 [seller, object, deadline, Constr0 [], seller, 0]
        assert!(hex.starts_with("d8799f581c"));
        assert!(hex.ends_with("d87980581c01010101010101010101010101010101010101010101010101010101 00ff".replace(' ', "").as_str()));
    }

    #[test]
    fn transitions() {
        let started = sample().started(100);
        assert_eq!(started.status, AuctionStatus::Started);
        assert_eq!(started.highest_bidder, started.seller);

        let (next, superseded) = started.outbid_by(KeyHash([2; 28]), 150);
        assert_eq!(next.highest_bid, 150);
        assert_eq!(next.highest_bidder, KeyHash([2; 28]));
        assert_eq!(superseded.status, AuctionStatus::Outbid);
        assert_eq!(superseded.highest_bid, 100);
        assert_ne!(
            next.to_plutus_data().hash().unwrap(),
            superseded.to_plutus_data().hash().unwrap()
        );
    }
}
