use bech32::{Bech32, Hrp};

use crate::error::{Error, Result};
use crate::hashing::{KeyHash, ScriptHash};
use crate::network::Network;

/// Payment or delegation credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Credential {
    Key(KeyHash),
    Script(ScriptHash),
}

impl Credential {
    fn bytes(&self) -> &[u8; 28] {
        match self {
            Credential::Key(h) => h.as_bytes(),
            Credential::Script(h) => h.as_bytes(),
        }
    }

    fn from_bytes(is_script: bool, bytes: &[u8]) -> Result<Self> {
        if is_script {
            Ok(Credential::Script(ScriptHash::from_slice(bytes)?))
        } else {
            Ok(Credential::Key(KeyHash::from_slice(bytes)?))
        }
    }
}

/// A Shelley address. Base and enterprise forms carry a payment credential;
/// reward addresses carry only a stake credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Shelley {
        network_id: u8,
        payment: Credential,
        delegation: Option<Credential>,
    },
    Reward {
        network_id: u8,
        stake: Credential,
    },
}

impl Address {
    pub fn enterprise_script(network: Network, script_hash: ScriptHash) -> Self {
        Address::Shelley {
            network_id: network.network_id(),
            payment: Credential::Script(script_hash),
            delegation: None,
        }
    }

    pub fn enterprise_key(network: Network, key_hash: KeyHash) -> Self {
        Address::Shelley {
            network_id: network.network_id(),
            payment: Credential::Key(key_hash),
            delegation: None,
        }
    }

    pub fn network_id(&self) -> u8 {
        match self {
            Address::Shelley { network_id, .. } | Address::Reward { network_id, .. } => {
                *network_id
            }
        }
    }

    pub fn payment_credential(&self) -> Option<Credential> {
        match self {
            Address::Shelley { payment, .. } => Some(*payment),
            Address::Reward { .. } => None,
        }
    }

    /// Verification-key hash of the payment part, if the address is key-locked.
    pub fn payment_key_hash(&self) -> Option<KeyHash> {
        match self.payment_credential() {
            Some(Credential::Key(h)) => Some(h),
            _ => None,
        }
    }

    /// True when spending from this address needs `key`'s signature.
    pub fn is_owned_by(&self, key: &KeyHash) -> bool {
        self.payment_key_hash().as_ref() == Some(key)
    }

    pub fn is_script(&self) -> bool {
        matches!(self.payment_credential(), Some(Credential::Script(_)))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Address::Shelley {
                network_id,
                payment,
                delegation,
            } => {
                let pay_script = matches!(payment, Credential::Script(_));
                let mut out = Vec::with_capacity(57);
                match delegation {
                    Some(stake) => {
                        let stake_script = matches!(stake, Credential::Script(_));
                        let kind = (pay_script as u8) | ((stake_script as u8) << 1);
                        out.push((kind << 4) | (network_id & 0x0f));
                        out.extend_from_slice(payment.bytes());
                        out.extend_from_slice(stake.bytes());
                    }
                    None => {
                        let kind = 0b0110 | pay_script as u8;
                        out.push((kind << 4) | (network_id & 0x0f));
                        out.extend_from_slice(payment.bytes());
                    }
                }
                out
            }
            Address::Reward { network_id, stake } => {
                let kind = 0b1110 | matches!(stake, Credential::Script(_)) as u8;
                let mut out = Vec::with_capacity(29);
                out.push((kind << 4) | (network_id & 0x0f));
                out.extend_from_slice(stake.bytes());
                out
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = *bytes
            .first()
            .ok_or_else(|| Error::Address("empty address".into()))?;
        let kind = header >> 4;
        let network_id = header & 0x0f;
        let body = &bytes[1..];
        match kind {
            0..=3 => {
                if body.len() != 56 {
                    return Err(Error::Address(format!(
                        "base address body must be 56 bytes, got {}",
                        body.len()
                    )));
                }
                Ok(Address::Shelley {
                    network_id,
                    payment: Credential::from_bytes(kind & 0b01 != 0, &body[..28])?,
                    delegation: Some(Credential::from_bytes(kind & 0b10 != 0, &body[28..])?),
                })
            }
            6 | 7 => {
                if body.len() != 28 {
                    return Err(Error::Address(format!(
                        "enterprise address body must be 28 bytes, got {}",
                        body.len()
                    )));
                }
                Ok(Address::Shelley {
                    network_id,
                    payment: Credential::from_bytes(kind == 7, body)?,
                    delegation: None,
                })
            }
            14 | 15 => {
                if body.len() != 28 {
                    return Err(Error::Address(format!(
                        "reward address body must be 28 bytes, got {}",
                        body.len()
                    )));
                }
                Ok(Address::Reward {
                    network_id,
                    stake: Credential::from_bytes(kind == 15, body)?,
                })
            }
            4 | 5 => Err(Error::Address("pointer addresses are not supported".into())),
            other => Err(Error::Address(format!("unsupported address type {other}"))),
        }
    }

    pub fn from_bech32(s: &str) -> Result<Self> {
        let (hrp, data) =
            bech32::decode(s.trim()).map_err(|e| Error::Address(format!("bech32: {e}")))?;
        let addr = Self::from_bytes(&data)?;
        let expected = addr.hrp();
        if hrp.as_str() != expected {
            return Err(Error::Address(format!(
                "prefix {} does not match network id {}",
                hrp.as_str(),
                addr.network_id()
            )));
        }
        Ok(addr)
    }

    pub fn to_bech32(&self) -> Result<String> {
        let hrp = Hrp::parse(self.hrp()).map_err(|e| Error::Address(e.to_string()))?;
        bech32::encode::<Bech32>(hrp, &self.to_bytes()).map_err(|e| Error::Address(e.to_string()))
    }

    fn hrp(&self) -> &'static str {
        match (self, self.network_id() == 1) {
            (Address::Reward { .. }, true) => "stake",
            (Address::Reward { .. }, false) => "stake_test",
            (_, true) => "addr",
            (_, false) => "addr_test",
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_bech32() {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{}", hex::encode(self.to_bytes())),
        }
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_bech32(s)
    }
}

impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        let encoded = self.to_bech32().map_err(serde::ser::Error::custom)?;
        s.serialize_str(&encoded)
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // CIP-19 test vectors.
    const BASE_KEY_KEY: &str = "addr1qx2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzer3n0d3vllmyqwsx5wktcd8cc3sq835lu7drv2xwl2wywfgse35a3x";
    const ENTERPRISE_KEY: &str = "addr1vx2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzers66hrl8";
    const ENTERPRISE_SCRIPT_TEST: &str =
        "addr_test1wz2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzersg6ll8z";

    #[test]
    fn base_address_roundtrip() {
        let addr = Address::from_bech32(BASE_KEY_KEY).unwrap();
        assert_eq!(addr.network_id(), 1);
        assert!(matches!(
            addr,
            Address::Shelley {
                delegation: Some(Credential::Key(_)),
                ..
            }
        ));
        assert_eq!(addr.to_bech32().unwrap(), BASE_KEY_KEY);
    }

    #[test]
    fn enterprise_key_hash_extraction() {
        let addr = Address::from_bech32(ENTERPRISE_KEY).unwrap();
        let kh = addr.payment_key_hash().unwrap();
        assert_eq!(
            kh.to_string(),
            "9493315cd92eb5d8c4304e67b7e16ae36d61d34502694657811a2c8e"
        );
        assert_eq!(Address::enterprise_key(Network::Mainnet, kh), addr);
    }

    #[test]
    fn script_address_has_no_key_hash() {
        let hash: ScriptHash = "9493315cd92eb5d8c4304e67b7e16ae36d61d34502694657811a2c8e"
            .parse()
            .unwrap();
        let addr = Address::enterprise_script(Network::Preview, hash);
        assert!(addr.is_script());
        assert!(addr.payment_key_hash().is_none());
        assert_eq!(addr.to_bech32().unwrap(), ENTERPRISE_SCRIPT_TEST);
        assert_eq!(addr.to_bytes()[0], 0x70);
    }

    #[test]
    fn rejects_pointer_and_mismatched_prefix() {
        let mut bytes = Address::from_bech32(ENTERPRISE_KEY).unwrap().to_bytes();
        bytes[0] = 0x41;
        assert!(Address::from_bytes(&bytes).is_err());

        let hrp = Hrp::parse("addr_test").unwrap();
        let mainnet_bytes = Address::from_bech32(ENTERPRISE_KEY).unwrap().to_bytes();
        let wrong = bech32::encode::<Bech32>(hrp, &mainnet_bytes).unwrap();
        assert!(Address::from_bech32(&wrong).is_err());
    }
}
