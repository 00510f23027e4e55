use blake2::digest::consts::{U28, U32};
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

type Blake2b224 = Blake2b<U28>;
type Blake2b256 = Blake2b<U32>;

pub fn blake2b_224(data: &[u8]) -> [u8; 28] {
    Blake2b224::digest(data).into()
}

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    Blake2b256::digest(data).into()
}

/// Fixed-length digest newtype with hex Display/FromStr and hex serde.
macro_rules! digest_type {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| {
                    Error::Encoding(format!(
                        "{} must be {} bytes, got {}",
                        stringify!($name),
                        $len,
                        bytes.len()
                    ))
                })?;
                Ok(Self(arr))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let bytes = hex::decode(s.trim())
                    .map_err(|e| Error::Encoding(format!("bad hex: {e}")))?;
                Self::from_slice(&bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

digest_type!(
    /// Blake2b-224 of an ed25519 verification key.
    KeyHash,
    28
);
digest_type!(
    /// Blake2b-224 of a language-tagged script.
    ScriptHash,
    28
);
digest_type!(DatumHash, 32);
digest_type!(
    /// Blake2b-256 of the transaction body bytes.
    TxId,
    32
);
digest_type!(ScriptDataHash, 32);

impl KeyHash {
    pub fn of_verification_key(vkey: &[u8; 32]) -> Self {
        Self(blake2b_224(vkey))
    }
}

impl DatumHash {
    pub fn of(cbor: &[u8]) -> Self {
        Self(blake2b_256(cbor))
    }
}

impl TxId {
    pub fn of_body(body: &[u8]) -> Self {
        Self(blake2b_256(body))
    }
}
