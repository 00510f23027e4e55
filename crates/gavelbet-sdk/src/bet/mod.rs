//! Two-player bet settled by an oracle: deploy, join, win or timeout.

pub mod action;
pub mod state;
pub mod tx;

pub use action::BetAction;
pub use state::BetState;
pub use tx::deploy::{DeployBetParams, build_deploy_bet_tx};
pub use tx::join::{JoinParams, build_join_tx};
pub use tx::timeout::{TimeoutParams, build_timeout_tx};
pub use tx::win::{WinParams, build_win_tx, pick_winner};
