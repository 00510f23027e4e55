//! English auction: deploy, start, bid/outbid, withdraw, end.

pub mod action;
pub mod state;
pub mod tx;

pub use action::AuctionAction;
pub use state::{AuctionState, AuctionStatus};
pub use tx::bid::{BidParams, build_bid_tx, check_bid};
pub use tx::deploy::{DeployAuctionParams, build_deploy_auction_tx};
pub use tx::end::{EndParams, build_end_tx};
pub use tx::start::{StartParams, build_start_tx};
pub use tx::withdraw::{WithdrawParams, build_withdraw_tx};
