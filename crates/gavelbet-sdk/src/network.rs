use serde::{Deserialize, Serialize};

/// Network variants for Cardano.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Preprod,
    Preview,
}

/// Conversion between POSIX time and ledger slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotConfig {
    pub zero_time_ms: u64,
    pub zero_slot: u64,
    pub slot_length_ms: u64,
}

impl SlotConfig {
    /// Slot containing `posix_ms`. Times before the network start clamp to `zero_slot`.
    pub fn posix_to_slot(&self, posix_ms: u64) -> u64 {
        let elapsed = posix_ms.saturating_sub(self.zero_time_ms);
        self.zero_slot + elapsed / self.slot_length_ms
    }

    /// First slot whose start is at or after `posix_ms`.
    pub fn posix_to_slot_ceil(&self, posix_ms: u64) -> u64 {
        let elapsed = posix_ms.saturating_sub(self.zero_time_ms);
        self.zero_slot + elapsed.div_ceil(self.slot_length_ms)
    }

    pub fn slot_to_posix(&self, slot: u64) -> u64 {
        self.zero_time_ms + slot.saturating_sub(self.zero_slot) * self.slot_length_ms
    }
}

impl Network {
    pub fn is_mainnet(self) -> bool {
        matches!(self, Network::Mainnet)
    }

    /// Network id nibble carried in the address header.
    pub fn network_id(self) -> u8 {
        match self {
            Network::Mainnet => 1,
            Network::Preprod | Network::Preview => 0,
        }
    }

    pub fn address_hrp(self) -> &'static str {
        match self {
            Network::Mainnet => "addr",
            Network::Preprod | Network::Preview => "addr_test",
        }
    }

    pub fn blockfrost_url(self) -> &'static str {
        match self {
            Network::Mainnet => "https://cardano-mainnet.blockfrost.io/api/v0",
            Network::Preprod => "https://cardano-preprod.blockfrost.io/api/v0",
            Network::Preview => "https://cardano-preview.blockfrost.io/api/v0",
        }
    }

    pub fn slot_config(self) -> SlotConfig {
        match self {
            Network::Mainnet => SlotConfig {
                zero_time_ms: 1_596_059_091_000,
                zero_slot: 4_492_800,
                slot_length_ms: 1000,
            },
            Network::Preprod => SlotConfig {
                zero_time_ms: 1_655_769_600_000,
                zero_slot: 86_400,
                slot_length_ms: 1000,
            },
            Network::Preview => SlotConfig {
                zero_time_ms: 1_666_656_000_000,
                zero_slot: 0,
                slot_length_ms: 1000,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Preprod => "preprod",
            Network::Preview => "preview",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "cardano" => Ok(Network::Mainnet),
            "preprod" | "testnet" => Ok(Network::Preprod),
            "preview" => Ok(Network::Preview),
            _ => Err(format!("invalid network: {}", s)),
        }
    }
}
