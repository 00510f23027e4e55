use gavelbet_sdk::{AuctionState, AuctionStatus, BetState, KeyHash, Located, TxId};
use serde::{Deserialize, Serialize};

use crate::session::Session;
use crate::workflow::{AuctionWorkflow, BetWorkflow};
use crate::{COUNTERPARTY_KEY, ORACLE_KEY};

const MAX_OBJECT_LEN: usize = 64;

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionListing {
    pub out_ref: String,
    pub locked: u64,
    pub state: AuctionState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BetListing {
    pub out_ref: String,
    pub locked: u64,
    pub state: BetState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidResponse {
    pub tx_id: TxId,
    pub state: AuctionState,
    /// Output left for the previous bidder to withdraw.
    pub outbid: AuctionState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResponse {
    pub tx_id: TxId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowsResponse {
    pub revision: u64,
    pub auctions: Vec<AuctionWorkflow>,
    pub bets: Vec<BetWorkflow>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionFilter {
    /// Auctions still taking bids or not yet started.
    #[default]
    Open,
    /// Superseded bids waiting to be withdrawn.
    Outbid,
    All,
}

impl AuctionFilter {
    fn accepts(self, state: &AuctionState) -> bool {
        match self {
            Self::Open => matches!(
                state.status,
                AuctionStatus::NotStarted | AuctionStatus::Started
            ),
            Self::Outbid => state.status == AuctionStatus::Outbid,
            Self::All => true,
        }
    }
}

fn validate_object(object: &str) -> Result<(), String> {
    if object.trim().is_empty() || object.len() > MAX_OBJECT_LEN {
        return Err(format!("object must be 1-{MAX_OBJECT_LEN} bytes"));
    }
    Ok(())
}

fn validate_deadline(session: &Session, deadline_ms: u64) -> Result<(), String> {
    if deadline_ms <= session.sdk().now_ms() {
        return Err("deadline must be in the future".to_string());
    }
    Ok(())
}

fn auction_listing(located: Located<AuctionState>) -> AuctionListing {
    AuctionListing {
        out_ref: located.utxo.out_ref.to_string(),
        locked: located.utxo.output.value.coin,
        state: located.state,
    }
}

fn bet_listing(located: Located<BetState>) -> BetListing {
    BetListing {
        out_ref: located.utxo.out_ref.to_string(),
        locked: located.utxo.output.value.coin,
        state: located.state,
    }
}

/// Keep a seller's record in step with a bid placed from this session.
async fn record_auction_move(session: &Session, tx_id: TxId, state: &AuctionState) {
    let mut store = session.workflows().await;
    let tracked = store
        .auctions()
        .iter()
        .find(|w| !w.finished && w.matches(state))
        .cloned();
    if let Some(mut workflow) = tracked {
        workflow.advance(tx_id, state.clone());
        store.upsert_auction(workflow);
    }
}

// ============================================================================
// Auction commands
// ============================================================================

#[tracing::instrument(skip(session), err)]
pub async fn deploy_auction(
    session: &Session,
    object: &str,
    deadline_ms: u64,
) -> Result<AuctionWorkflow, String> {
    validate_object(object)?;
    validate_deadline(session, deadline_ms)?;

    let deployed = session
        .sdk()
        .deploy_auction(session.wallet(), object.as_bytes().to_vec(), deadline_ms)
        .await
        .map_err(|e| format!("deploy failed: {e}"))?;

    let workflow = AuctionWorkflow::from_deploy(session.sdk().network(), &deployed);
    session.workflows().await.upsert_auction(workflow.clone());
    tracing::info!(id = %workflow.id, tx = %deployed.tx_id, "auction deployed");
    Ok(workflow)
}

#[tracing::instrument(skip(session), err)]
pub async fn start_auction(
    session: &Session,
    workflow_id: &str,
    starting_bid: u64,
) -> Result<AuctionWorkflow, String> {
    let mut workflow = session
        .open_auction(workflow_id)
        .await
        .map_err(|e| e.to_string())?;

    let result = session
        .sdk()
        .start_auction(session.wallet(), &workflow.state, starting_bid)
        .await
        .map_err(|e| format!("start failed: {e}"))?;
    let started = result
        .new_state
        .ok_or_else(|| "start left no auction output".to_string())?;

    workflow.advance(result.tx_id, started);
    session.workflows().await.upsert_auction(workflow.clone());
    tracing::info!(id = %workflow.id, tx = %result.tx_id, "auction started");
    Ok(workflow)
}

#[tracing::instrument(skip(session, auction), err)]
pub async fn place_bid(
    session: &Session,
    auction: &AuctionState,
    amount: u64,
) -> Result<BidResponse, String> {
    let result = session
        .sdk()
        .place_bid(session.wallet(), auction, amount)
        .await
        .map_err(|e| format!("bid failed: {e}"))?;
    let state = result
        .new_state
        .ok_or_else(|| "bid left no auction output".to_string())?;
    let (_, outbid) = auction.outbid_by(state.highest_bidder, amount);

    record_auction_move(session, result.tx_id, &state).await;
    tracing::info!(tx = %result.tx_id, amount, "bid placed");
    Ok(BidResponse {
        tx_id: result.tx_id,
        state,
        outbid,
    })
}

#[tracing::instrument(skip(session, outbid), err)]
pub async fn withdraw_bid(session: &Session, outbid: &AuctionState) -> Result<TxResponse, String> {
    let result = session
        .sdk()
        .withdraw_bid(session.wallet(), outbid)
        .await
        .map_err(|e| format!("withdraw failed: {e}"))?;
    tracing::info!(tx = %result.tx_id, refunded = outbid.highest_bid, "bid withdrawn");
    Ok(TxResponse {
        tx_id: result.tx_id,
    })
}

/// End the auction. The record is refreshed first since bids from other
/// parties move the live state without this session seeing them.
#[tracing::instrument(skip(session), err)]
pub async fn end_auction(session: &Session, workflow_id: &str) -> Result<AuctionWorkflow, String> {
    let mut workflow = session
        .open_auction(workflow_id)
        .await
        .map_err(|e| e.to_string())?;

    let live = workflow
        .refresh(session.sdk())
        .await
        .map_err(|e| format!("refresh failed: {e}"))?;
    if !live {
        return Err(format!("no live output for {workflow_id}"));
    }

    let result = session
        .sdk()
        .end_auction(session.wallet(), &workflow.state)
        .await
        .map_err(|e| format!("end failed: {e}"))?;

    workflow.finish(result.tx_id);
    session.workflows().await.upsert_auction(workflow.clone());
    tracing::info!(
        id = %workflow.id,
        tx = %result.tx_id,
        winner = %result.previous_state.highest_bidder,
        "auction ended"
    );
    Ok(workflow)
}

/// Wait on a timer for the auction deadline, then end it.
#[tracing::instrument(skip(session), err)]
pub async fn end_auction_at_deadline(
    session: &Session,
    workflow_id: &str,
) -> Result<AuctionWorkflow, String> {
    let workflow = session
        .open_auction(workflow_id)
        .await
        .map_err(|e| e.to_string())?;
    session.sdk().wait_for_deadline(workflow.deadline).await;
    end_auction(session, workflow_id).await
}

pub async fn list_auctions(
    session: &Session,
    filter: AuctionFilter,
) -> Result<Vec<AuctionListing>, String> {
    let found = session
        .sdk()
        .list_auctions(|s| filter.accepts(s))
        .await
        .map_err(|e| format!("listing failed: {e}"))?;
    Ok(found.into_iter().map(auction_listing).collect())
}

// ============================================================================
// Bet commands
// ============================================================================

/// Open a bet with this session's wallet as player1. Oracle and counterparty
/// are the keys the secret provider holds under those names.
#[tracing::instrument(skip(session), err)]
pub async fn deploy_bet(
    session: &Session,
    wager: u64,
    deadline_ms: u64,
) -> Result<BetWorkflow, String> {
    if wager == 0 {
        return Err("wager must be > 0".to_string());
    }
    validate_deadline(session, deadline_ms)?;

    let oracle = session
        .signer(ORACLE_KEY)
        .map_err(|e| e.to_string())?
        .public_key_hash();
    let counterparty = session
        .signer(COUNTERPARTY_KEY)
        .map_err(|e| e.to_string())?
        .public_key_hash();

    let deployed = session
        .sdk()
        .deploy_bet(session.wallet(), oracle, counterparty, wager, deadline_ms)
        .await
        .map_err(|e| format!("deploy failed: {e}"))?;

    let workflow = BetWorkflow::from_deploy(session.sdk().network(), &deployed);
    session.workflows().await.upsert_bet(workflow.clone());
    tracing::info!(id = %workflow.id, tx = %deployed.tx_id, "bet deployed");
    Ok(workflow)
}

#[tracing::instrument(skip(session), err)]
pub async fn join_bet(session: &Session, workflow_id: &str) -> Result<BetWorkflow, String> {
    let mut workflow = session
        .open_bet(workflow_id)
        .await
        .map_err(|e| e.to_string())?;
    let counterparty = session
        .signer(COUNTERPARTY_KEY)
        .map_err(|e| e.to_string())?;

    let result = session
        .sdk()
        .join_bet(session.wallet(), &counterparty, &workflow.state)
        .await
        .map_err(|e| format!("join failed: {e}"))?;
    let joined = result
        .new_state
        .ok_or_else(|| "join left no bet output".to_string())?;

    workflow.advance(result.tx_id, joined);
    session.workflows().await.upsert_bet(workflow.clone());
    tracing::info!(id = %workflow.id, tx = %result.tx_id, "bet joined");
    Ok(workflow)
}

/// Settle as the oracle. Without `winner` the oracle draws one at random.
#[tracing::instrument(skip(session), err)]
pub async fn settle_bet(
    session: &Session,
    workflow_id: &str,
    winner: Option<&str>,
) -> Result<BetWorkflow, String> {
    let winner = winner
        .map(|hex| hex.parse::<KeyHash>())
        .transpose()
        .map_err(|e| format!("invalid winner: {e}"))?;

    let mut workflow = session
        .open_bet(workflow_id)
        .await
        .map_err(|e| e.to_string())?;
    let oracle = session.signer(ORACLE_KEY).map_err(|e| e.to_string())?;

    let result = session
        .sdk()
        .settle_bet(session.wallet(), &oracle, &workflow.state, winner)
        .await
        .map_err(|e| format!("settle failed: {e}"))?;

    workflow.finish(result.tx_id, result.winner);
    session.workflows().await.upsert_bet(workflow.clone());
    tracing::info!(id = %workflow.id, tx = %result.tx_id, "bet settled");
    Ok(workflow)
}

#[tracing::instrument(skip(session), err)]
pub async fn timeout_bet(session: &Session, workflow_id: &str) -> Result<BetWorkflow, String> {
    let mut workflow = session
        .open_bet(workflow_id)
        .await
        .map_err(|e| e.to_string())?;
    let counterparty = session
        .signer(COUNTERPARTY_KEY)
        .map_err(|e| e.to_string())?;

    let result = session
        .sdk()
        .timeout_bet(session.wallet(), &counterparty, &workflow.state)
        .await
        .map_err(|e| format!("timeout failed: {e}"))?;

    workflow.finish(result.tx_id, None);
    session.workflows().await.upsert_bet(workflow.clone());
    tracing::info!(id = %workflow.id, tx = %result.tx_id, "bet refunded");
    Ok(workflow)
}

/// Wait on a timer for the bet deadline, then refund both wagers.
#[tracing::instrument(skip(session), err)]
pub async fn timeout_bet_at_deadline(
    session: &Session,
    workflow_id: &str,
) -> Result<BetWorkflow, String> {
    let workflow = session
        .open_bet(workflow_id)
        .await
        .map_err(|e| e.to_string())?;
    session.sdk().wait_for_deadline(workflow.deadline).await;
    timeout_bet(session, workflow_id).await
}

/// Live bets; `joined` narrows to joined or unjoined ones.
pub async fn list_bets(session: &Session, joined: Option<bool>) -> Result<Vec<BetListing>, String> {
    let found = session
        .sdk()
        .list_bets(|s| joined.is_none_or(|j| s.is_joined == j))
        .await
        .map_err(|e| format!("listing failed: {e}"))?;
    Ok(found.into_iter().map(bet_listing).collect())
}

// ============================================================================
// Workflow records
// ============================================================================

pub async fn list_workflows(session: &Session) -> Result<WorkflowsResponse, String> {
    let store = session.workflows().await;
    Ok(WorkflowsResponse {
        revision: store.revision(),
        auctions: store.auctions().to_vec(),
        bets: store.bets().to_vec(),
    })
}

/// Re-read every unfinished workflow from the chain, e.g. after a restart.
/// Records whose output is gone are left as they are and reported in the log.
pub async fn refresh_workflows(session: &Session) -> Result<WorkflowsResponse, String> {
    let (auctions, bets) = {
        let store = session.workflows().await;
        let auctions: Vec<AuctionWorkflow> =
            store.auctions().iter().filter(|w| !w.finished).cloned().collect();
        let bets: Vec<BetWorkflow> = store.bets().iter().filter(|w| !w.finished).cloned().collect();
        (auctions, bets)
    };

    for mut workflow in auctions {
        let before = workflow.state.clone();
        let live = workflow
            .refresh(session.sdk())
            .await
            .map_err(|e| format!("refresh of {} failed: {e}", workflow.id))?;
        if !live {
            tracing::warn!(id = %workflow.id, "no live output");
        } else if workflow.state != before {
            session.workflows().await.upsert_auction(workflow);
        }
    }

    for mut workflow in bets {
        let before = workflow.state.clone();
        let live = workflow
            .refresh(session.sdk())
            .await
            .map_err(|e| format!("refresh of {} failed: {e}", workflow.id))?;
        if !live {
            tracing::warn!(id = %workflow.id, "no live output");
        } else if workflow.state != before {
            session.workflows().await.upsert_bet(workflow);
        }
    }

    list_workflows(session).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auction(status: AuctionStatus) -> AuctionState {
        AuctionState {
            status,
            ..AuctionState::deployed(KeyHash([1; 28]), "Vase", 1)
        }
    }

    #[test]
    fn filter_selects_by_status() {
        assert!(AuctionFilter::Open.accepts(&auction(AuctionStatus::NotStarted)));
        assert!(AuctionFilter::Open.accepts(&auction(AuctionStatus::Started)));
        assert!(!AuctionFilter::Open.accepts(&auction(AuctionStatus::Outbid)));
        assert!(AuctionFilter::Outbid.accepts(&auction(AuctionStatus::Outbid)));
        assert!(AuctionFilter::All.accepts(&auction(AuctionStatus::Outbid)));
    }

    #[test]
    fn filter_from_json() {
        let f: AuctionFilter = serde_json::from_str("\"outbid\"").unwrap();
        assert_eq!(f, AuctionFilter::Outbid);
        assert_eq!(AuctionFilter::default(), AuctionFilter::Open);
    }

    #[test]
    fn object_bounds() {
        assert!(validate_object("Painting#1").is_ok());
        assert!(validate_object("   ").is_err());
        assert!(validate_object(&"x".repeat(MAX_OBJECT_LEN + 1)).is_err());
    }
}
