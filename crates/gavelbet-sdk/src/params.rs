use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lovelace locked by deploy outputs to satisfy the ledger's minimum for an
/// output carrying a datum. Start and Join release it again.
pub const MIN_DEPOSIT: u64 = 2_000_000;

/// Per-output overhead the ledger adds to the serialized size when computing
/// the minimum lovelace an output must hold.
pub const UTXO_ENTRY_OVERHEAD: u64 = 160;

/// Script execution budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

impl ExUnits {
    pub fn new(mem: u64, steps: u64) -> Self {
        Self { mem, steps }
    }

    pub fn checked_add(self, other: ExUnits) -> Option<ExUnits> {
        Some(ExUnits {
            mem: self.mem.checked_add(other.mem)?,
            steps: self.steps.checked_add(other.steps)?,
        })
    }

    pub fn fits_within(self, limit: ExUnits) -> bool {
        self.mem <= limit.mem && self.steps <= limit.steps
    }
}

/// Exact non-negative rational, used for execution-unit prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub numerator: u64,
    pub denominator: u64,
}

impl Rational {
    pub fn new(numerator: u64, denominator: u64) -> Result<Self> {
        if denominator == 0 {
            return Err(Error::Query("rational with zero denominator".into()));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Parse a plain decimal such as `0.0577` exactly.
    pub fn from_decimal(s: &str) -> Result<Self> {
        let s = s.trim();
        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(Error::Query(format!("invalid decimal {s:?}")));
        }
        let digits = format!("{int_part}{frac_part}");
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Query(format!("invalid decimal {s:?}")));
        }
        let numerator: u64 = digits
            .parse()
            .map_err(|e| Error::Query(format!("invalid decimal {s:?}: {e}")))?;
        let denominator = 10u64
            .checked_pow(frac_part.len() as u32)
            .ok_or_else(|| Error::Query(format!("too many decimals in {s:?}")))?;
        Self::new(numerator, denominator)
    }
}

/// Ledger parameters that shape fees, minimum output values and collateral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    pub min_fee_a: u64,
    pub min_fee_b: u64,
    pub coins_per_utxo_byte: u64,
    pub price_mem: Rational,
    pub price_steps: Rational,
    pub collateral_percent: u64,
    pub max_collateral_inputs: u32,
    pub max_tx_size: u64,
    pub max_tx_ex_units: ExUnits,
    /// Plutus V3 cost model, in ledger parameter order.
    pub plutus_v3_cost_model: Vec<i64>,
}

impl ProtocolParams {
    /// Linear fee for a transaction of `size` bytes running `ex_units`.
    pub fn min_fee(&self, size: u64, ex_units: ExUnits) -> Result<u64> {
        let size_fee = self
            .min_fee_a
            .checked_mul(size)
            .and_then(|v| v.checked_add(self.min_fee_b))
            .ok_or(Error::ValueOverflow)?;
        let exec_fee = self.execution_fee(ex_units)?;
        size_fee.checked_add(exec_fee).ok_or(Error::ValueOverflow)
    }

    /// `ceil(mem * price_mem + steps * price_steps)`, computed exactly.
    pub fn execution_fee(&self, ex_units: ExUnits) -> Result<u64> {
        let pm = self.price_mem;
        let ps = self.price_steps;
        let mem = u128::from(ex_units.mem)
            .checked_mul(u128::from(pm.numerator))
            .and_then(|v| v.checked_mul(u128::from(ps.denominator)));
        let steps = u128::from(ex_units.steps)
            .checked_mul(u128::from(ps.numerator))
            .and_then(|v| v.checked_mul(u128::from(pm.denominator)));
        let num = mem
            .zip(steps)
            .and_then(|(m, s)| m.checked_add(s))
            .ok_or(Error::ValueOverflow)?;
        let den = u128::from(pm.denominator) * u128::from(ps.denominator);
        u64::try_from(num.div_ceil(den)).map_err(|_| Error::ValueOverflow)
    }

    /// Minimum lovelace for an output whose serialized size is `output_size`.
    pub fn min_utxo_lovelace(&self, output_size: u64) -> u64 {
        self.coins_per_utxo_byte
            .saturating_mul(UTXO_ENTRY_OVERHEAD + output_size)
    }

    pub fn required_collateral(&self, fee: u64) -> Result<u64> {
        let required = (u128::from(fee) * u128::from(self.collateral_percent)).div_ceil(100);
        u64::try_from(required).map_err(|_| Error::ValueOverflow)
    }
}

/// Build-time knobs that are not ledger parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Execution budget declared for every redeemer.
    pub redeemer_budget: ExUnits,
    /// Upper validity bound, relative to the build time, when an action sets none.
    #[serde(with = "duration_secs")]
    pub validity_window: Duration,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            redeemer_budget: ExUnits::new(7_000_000, 3_000_000_000),
            validity_window: Duration::from_secs(15 * 60),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
