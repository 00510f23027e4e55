use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain::ChainBackend;
use crate::error::{Error, Result};
use crate::hashing::TxId;
use crate::ledger::UnspentOutput;
use crate::tx::SignedTransaction;
use crate::wallet::Wallet;

/// How delays grow between visibility polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    Exponential {
        factor: u32,
        #[serde(with = "duration_ms")]
        max_delay: Duration,
    },
}

/// Bounded polling schedule for post-submission lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub initial_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(1500),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, initial_delay: Duration, factor: u32, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff: Backoff::Exponential { factor, max_delay },
        }
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.initial_delay,
            Backoff::Exponential { factor, max_delay } => {
                let exp = attempt.saturating_sub(1);
                let mult = factor.max(1).saturating_pow(exp);
                self.initial_delay.saturating_mul(mult).min(max_delay)
            }
        }
    }
}

/// Submit through the wallet. Rejections surface as `Error::Submission`
/// with the provider's message.
pub async fn submit(wallet: &dyn Wallet, tx: &SignedTransaction) -> Result<TxId> {
    let id = wallet.submit_transaction(tx.bytes()).await.map_err(|e| match e {
        Error::Submission(msg) => Error::Submission(msg),
        other => Error::Submission(other.to_string()),
    })?;
    if id != tx.tx_id() {
        log::warn!("provider reported id {id} for transaction {}", tx.tx_id());
    }
    log::info!("submitted {}", tx.tx_id());
    Ok(tx.tx_id())
}

/// Poll the provider until outputs of `tx_id` show up.
///
/// Not-found and empty responses are retried according to `policy`; any other
/// error is returned immediately.
pub async fn await_visible(
    chain: &dyn ChainBackend,
    tx_id: &TxId,
    policy: &RetryPolicy,
) -> Result<Vec<UnspentOutput>> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match chain.fetch_outputs_by_tx(tx_id).await {
            Ok(outputs) if !outputs.is_empty() => {
                log::debug!("{tx_id} visible after {attempt} attempt(s)");
                return Ok(outputs);
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        if attempt < attempts {
            let delay = policy.delay_for(attempt);
            log::warn!("{tx_id} not visible yet (attempt {attempt}/{attempts}), retrying in {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }
    Err(Error::VisibilityTimeout {
        tx_id: *tx_id,
        attempts,
    })
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
