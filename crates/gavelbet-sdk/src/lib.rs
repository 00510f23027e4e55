pub mod address;
pub mod assembly;
pub mod auction;
pub mod bet;
pub mod chain;
pub mod contract;
pub mod error;
pub mod hashing;
pub mod ledger;
pub mod locator;
pub mod network;
pub mod params;
pub mod plutus;
pub mod sdk;
pub mod signing;
pub mod submit;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tx;
pub mod wallet;

// Core types
pub use address::{Address, Credential};
pub use chain::{BlockfrostBackend, ChainBackend};
pub use contract::CompiledValidator;
pub use error::{Error, Result};
pub use hashing::{DatumHash, KeyHash, ScriptDataHash, ScriptHash, TxId};
pub use ledger::{AssetName, OutputDatum, OutputRef, PolicyId, TxOutput, UnspentOutput, Value};
pub use network::Network;
pub use params::{BuildConfig, ExUnits, MIN_DEPOSIT, ProtocolParams};
pub use plutus::{FromPlutusData, PlutusData, ToPlutusData};

// Contract families
pub use auction::{AuctionAction, AuctionState, AuctionStatus};
pub use bet::{BetAction, BetState};

// Transaction pipeline
pub use assembly::{FinalizeInputs, finalize};
pub use locator::{Located, find_all_by_predicate, find_by_state};
pub use sdk::{
    AuctionActionResult, BetActionResult, Clock, DeployResult, GavelbetSdk, SystemClock,
};
pub use signing::collect_signatures;
pub use submit::{Backoff, RetryPolicy, await_visible, submit};
pub use tx::{FeeBreakdown, SignedTransaction, TxDraft, UnsignedTransaction};
pub use wallet::{KeySigner, KeyWallet, TxSigner, Wallet};
