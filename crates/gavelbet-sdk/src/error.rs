use crate::auction::state::AuctionStatus;
use crate::hashing::TxId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("structured data encoding error: {0}")]
    Encoding(String),

    #[error("contract compilation failed: {0}")]
    Compilation(String),

    #[error("invalid address: {0}")]
    Address(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("too early or too late: {0}")]
    Timing(String),

    #[error("auction not in expected status (expected {expected:?}, found {found:?})")]
    InvalidAuctionStatus {
        expected: AuctionStatus,
        found: AuctionStatus,
    },

    #[error("bet has not been joined yet")]
    BetNotJoined,

    #[error("bet has already been joined")]
    BetAlreadyJoined,

    #[error("bid of {bid} lovelace does not exceed the current highest bid of {highest}")]
    BidTooLow { bid: u64, highest: u64 },

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("value arithmetic overflow")]
    ValueOverflow,

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("transaction balancing failed: {0}")]
    Balancing(String),

    #[error("output carries {actual} lovelace, ledger minimum is {required}")]
    BelowMinUtxo { required: u64, actual: u64 },

    #[error("no pure-lovelace wallet output available as collateral")]
    NoCollateral,

    #[error("execution budget exceeds the per-transaction limit: {0}")]
    ExecutionBudget(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("missing signatures from: {}", .0.join(", "))]
    MissingSigner(Vec<String>),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("chain query error: {0}")]
    Query(String),

    #[error("submission rejected: {0}")]
    Submission(String),

    #[error("transaction {tx_id} not visible after {attempts} attempts")]
    VisibilityTimeout { tx_id: TxId, attempts: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the "not yet propagated" family that post-submission polling retries on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<minicbor::decode::Error> for Error {
    fn from(e: minicbor::decode::Error) -> Self {
        Error::Encoding(e.to_string())
    }
}

impl From<minicbor::encode::Error<std::convert::Infallible>> for Error {
    fn from(e: minicbor::encode::Error<std::convert::Infallible>) -> Self {
        Error::Encoding(e.to_string())
    }
}
