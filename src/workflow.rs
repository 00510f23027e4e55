use gavelbet_sdk::{
    AuctionState, AuctionStatus, BetState, DeployResult, GavelbetSdk, KeyHash, Located, Network,
    TxId,
};
use serde::{Deserialize, Serialize};

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Object identifiers are free-form bytes; JSON carries them as hex.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Auction workflow
// ============================================================================

/// A seller's auction from deploy to end. The identifying fields stay fixed;
/// `state` is the last state this app saw at the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionWorkflow {
    pub id: String,
    pub network: Network,
    pub seller: KeyHash,
    #[serde(with = "hex_bytes")]
    pub object: Vec<u8>,
    pub deadline: u64,
    pub state: AuctionState,
    pub last_tx: TxId,
    #[serde(default)]
    pub finished: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl AuctionWorkflow {
    pub fn id_for(seller: &KeyHash, object: &[u8], deadline: u64) -> String {
        format!("auction:{seller}:{}:{deadline}", hex::encode(object))
    }

    fn from_state(network: Network, tx_id: TxId, state: AuctionState) -> Self {
        let now = now_rfc3339();
        Self {
            id: Self::id_for(&state.seller, &state.object, state.deadline),
            network,
            seller: state.seller,
            object: state.object.clone(),
            deadline: state.deadline,
            state,
            last_tx: tx_id,
            finished: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn from_deploy(network: Network, deployed: &DeployResult<AuctionState>) -> Self {
        Self::from_state(network, deployed.tx_id, deployed.state.clone())
    }

    /// Record for a live auction found at the contract address.
    pub fn from_chain(network: Network, located: &Located<AuctionState>) -> Self {
        Self::from_state(network, located.utxo.out_ref.tx_id, located.state.clone())
    }

    /// Object identifier for display.
    pub fn object_label(&self) -> String {
        String::from_utf8_lossy(&self.object).into_owned()
    }

    /// True when `state` belongs to this auction, whatever its status.
    pub fn matches(&self, state: &AuctionState) -> bool {
        state.seller == self.seller && state.object == self.object && state.deadline == self.deadline
    }

    pub fn advance(&mut self, tx_id: TxId, state: AuctionState) {
        self.state = state;
        self.last_tx = tx_id;
        self.updated_at = now_rfc3339();
    }

    pub fn finish(&mut self, tx_id: TxId) {
        self.state.status = AuctionStatus::Ended;
        self.last_tx = tx_id;
        self.finished = true;
        self.updated_at = now_rfc3339();
    }

    /// Re-read the live state from the chain. Returns false when no live
    /// output for this auction exists.
    pub async fn refresh(&mut self, sdk: &GavelbetSdk) -> gavelbet_sdk::Result<bool> {
        let target = self.clone();
        let live = sdk
            .list_auctions(|s| target.matches(s) && s.status != AuctionStatus::Outbid)
            .await?;
        match live.into_iter().next() {
            Some(found) => {
                if found.state != self.state {
                    tracing::info!(id = %self.id, status = ?found.state.status, "chain moved");
                    self.state = found.state;
                    self.updated_at = now_rfc3339();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// Bet workflow
// ============================================================================

/// A bet from deploy to settlement, carrying oracle, players, wager and
/// deadline forward between steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetWorkflow {
    pub id: String,
    pub network: Network,
    pub oracle: KeyHash,
    pub player1: KeyHash,
    pub player2: KeyHash,
    pub wager: u64,
    pub deadline: u64,
    pub state: BetState,
    pub last_tx: TxId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<KeyHash>,
    #[serde(default)]
    pub finished: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl BetWorkflow {
    pub fn id_for(state: &BetState) -> String {
        format!(
            "bet:{}:{}:{}:{}:{}",
            state.oracle, state.player1, state.player2, state.wager, state.deadline
        )
    }

    fn from_state(network: Network, tx_id: TxId, state: BetState) -> Self {
        let now = now_rfc3339();
        Self {
            id: Self::id_for(&state),
            network,
            oracle: state.oracle,
            player1: state.player1,
            player2: state.player2,
            wager: state.wager,
            deadline: state.deadline,
            state,
            last_tx: tx_id,
            winner: None,
            finished: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn from_deploy(network: Network, deployed: &DeployResult<BetState>) -> Self {
        Self::from_state(network, deployed.tx_id, deployed.state.clone())
    }

    pub fn from_chain(network: Network, located: &Located<BetState>) -> Self {
        Self::from_state(network, located.utxo.out_ref.tx_id, located.state.clone())
    }

    pub fn matches(&self, state: &BetState) -> bool {
        state.oracle == self.oracle
            && state.player1 == self.player1
            && state.player2 == self.player2
            && state.wager == self.wager
            && state.deadline == self.deadline
    }

    pub fn advance(&mut self, tx_id: TxId, state: BetState) {
        self.state = state;
        self.last_tx = tx_id;
        self.updated_at = now_rfc3339();
    }

    pub fn finish(&mut self, tx_id: TxId, winner: Option<KeyHash>) {
        self.last_tx = tx_id;
        self.winner = winner;
        self.finished = true;
        self.updated_at = now_rfc3339();
    }

    pub async fn refresh(&mut self, sdk: &GavelbetSdk) -> gavelbet_sdk::Result<bool> {
        let target = self.clone();
        let live = sdk.list_bets(|s| target.matches(s)).await?;
        match live.into_iter().next() {
            Some(found) => {
                if found.state != self.state {
                    self.state = found.state;
                    self.updated_at = now_rfc3339();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Workflow records for the running session. Nothing is written to disk: the
/// ledger is the only durable state, and `rebuild` recovers the records from
/// it after a restart.
#[derive(Debug, Default)]
pub struct WorkflowStore {
    auctions: Vec<AuctionWorkflow>,
    bets: Vec<BetWorkflow>,
    revision: u64,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records for every live auction `owner` sells and every live bet where
    /// `owner` is a player or the oracle.
    pub async fn rebuild(sdk: &GavelbetSdk, owner: &KeyHash) -> gavelbet_sdk::Result<Self> {
        let network = sdk.network();
        let mut store = Self::new();

        let auctions = sdk
            .list_auctions(|s| s.seller == *owner && s.status != AuctionStatus::Outbid)
            .await?;
        for located in &auctions {
            store.upsert_auction(AuctionWorkflow::from_chain(network, located));
        }

        let bets = sdk
            .list_bets(|s| s.is_player(owner) || s.oracle == *owner)
            .await?;
        for located in &bets {
            store.upsert_bet(BetWorkflow::from_chain(network, located));
        }

        tracing::info!(
            auctions = store.auctions.len(),
            bets = store.bets.len(),
            "workflows recovered from chain"
        );
        Ok(store)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn auctions(&self) -> &[AuctionWorkflow] {
        &self.auctions
    }

    pub fn bets(&self) -> &[BetWorkflow] {
        &self.bets
    }

    pub fn auction(&self, id: &str) -> Option<&AuctionWorkflow> {
        self.auctions.iter().find(|w| w.id == id)
    }

    pub fn bet(&self, id: &str) -> Option<&BetWorkflow> {
        self.bets.iter().find(|w| w.id == id)
    }

    pub fn upsert_auction(&mut self, workflow: AuctionWorkflow) {
        match self.auctions.iter_mut().find(|w| w.id == workflow.id) {
            Some(existing) => *existing = workflow,
            None => self.auctions.push(workflow),
        }
        self.revision += 1;
    }

    pub fn upsert_bet(&mut self, workflow: BetWorkflow) {
        match self.bets.iter_mut().find(|w| w.id == workflow.id) {
            Some(existing) => *existing = workflow,
            None => self.bets.push(workflow),
        }
        self.revision += 1;
    }
}
