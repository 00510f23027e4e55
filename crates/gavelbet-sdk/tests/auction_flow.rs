use std::sync::Arc;
use std::time::Duration;

use gavelbet_sdk::testing::{MockLedger, TEST_NOW_MS, auction_validator, bet_validator};
use gavelbet_sdk::{
    AuctionState, AuctionStatus, ChainBackend, Error, GavelbetSdk, KeySigner, KeyWallet,
    MIN_DEPOSIT, Network, RetryPolicy, Value, find_by_state,
};

const HOUR_MS: u64 = 3_600_000;

struct Env {
    ledger: Arc<MockLedger>,
    sdk: GavelbetSdk,
}

fn setup() -> Env {
    let ledger = Arc::new(MockLedger::new(Network::Preview));
    let chain: Arc<dyn ChainBackend> = ledger.clone();
    let sdk = GavelbetSdk::new(chain, Network::Preview, auction_validator(), bet_validator())
        .unwrap()
        .with_retry_policy(RetryPolicy::fixed(5, Duration::from_millis(1)))
        .with_clock(ledger.clone());
    Env { ledger, sdk }
}

async fn funded_wallet(env: &Env, lovelace: u64) -> KeyWallet {
    let signer = KeySigner::generate(&mut rand::thread_rng());
    let wallet = KeyWallet::new(signer, Network::Preview, env.ledger.clone());
    env.ledger.fund(wallet.address(), Value::lovelace(lovelace)).await;
    wallet
}

#[tokio::test]
async fn deploy_start_bid_withdraw_end() {
    let env = setup();
    let seller = funded_wallet(&env, 300_000_000).await;
    let bidder = funded_wallet(&env, 300_000_000).await;
    let deadline = TEST_NOW_MS + HOUR_MS;

    // Deploy
    let deployed = env
        .sdk
        .deploy_auction(&seller, "Painting#1", deadline)
        .await
        .unwrap();
    assert_eq!(deployed.state.status, AuctionStatus::NotStarted);
    assert_eq!(deployed.state.object_label(), "Painting#1");
    assert_eq!(deployed.output.coin(), MIN_DEPOSIT);

    // Start
    let started = env
        .sdk
        .start_auction(&seller, &deployed.state, 100_000_000)
        .await
        .unwrap();
    let started_state = started.new_state.unwrap();
    assert_eq!(started_state.highest_bid, 100_000_000);
    let deposit_back = started
        .outputs
        .iter()
        .filter(|u| u.output.address == *seller.address())
        .any(|u| u.coin() == MIN_DEPOSIT);
    assert!(deposit_back);

    // Bid
    let bid = env
        .sdk
        .place_bid(&bidder, &started_state, 150_000_000)
        .await
        .unwrap();
    let live_state = bid.new_state.clone().unwrap();
    let live = find_by_state(
        &*env.ledger,
        env.sdk.auction_validator().address(),
        &live_state,
    )
    .await
    .unwrap();
    let decoded: AuctionState = live.decode_state().unwrap();
    assert_eq!(decoded.status, AuctionStatus::Started);
    assert_eq!(decoded.highest_bid, 150_000_000);
    assert_eq!(decoded.highest_bidder, bidder.signer().public_key_hash());
    assert_eq!(live.coin(), 150_000_000);

    let superseded = bid
        .outputs
        .iter()
        .find_map(|u| {
            u.decode_state::<AuctionState>()
                .ok()
                .filter(|s| s.status == AuctionStatus::Outbid)
                .map(|s| (u.coin(), s))
        })
        .unwrap();
    assert_eq!(superseded.0, 100_000_000);
    assert_eq!(superseded.1.highest_bidder, seller.signer().public_key_hash());

    // The seller's own opening bid comes back through Withdraw.
    let before = env.ledger.balance(seller.address()).await;
    env.sdk.withdraw_bid(&seller, &superseded.1).await.unwrap();
    let after = env.ledger.balance(seller.address()).await;
    assert!(after > before + 99_000_000);

    // End is refused until the deadline.
    let early = env.sdk.end_auction(&seller, &live_state).await.unwrap_err();
    assert!(matches!(early, Error::Timing(_)));

    env.ledger.set_now_ms(deadline + 5_000);
    let before = env.ledger.balance(seller.address()).await;
    let ended = env.sdk.end_auction(&seller, &live_state).await.unwrap();
    assert!(ended.new_state.is_none());
    let after = env.ledger.balance(seller.address()).await;
    assert!(after > before + 149_000_000);

    let remaining = env.sdk.list_auctions(|_| true).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn low_bid_fails_before_network() {
    let env = setup();
    let seller = funded_wallet(&env, 300_000_000).await;
    let bidder = funded_wallet(&env, 300_000_000).await;

    let deployed = env
        .sdk
        .deploy_auction(&seller, "Vase", TEST_NOW_MS + HOUR_MS)
        .await
        .unwrap();
    let started = env
        .sdk
        .start_auction(&seller, &deployed.state, 100_000_000)
        .await
        .unwrap()
        .new_state
        .unwrap();

    let queries = env.ledger.by_tx_queries();
    for amount in [100_000_000, 99_999_999] {
        let err = env
            .sdk
            .place_bid(&bidder, &started, amount)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BidTooLow { highest: 100_000_000, .. }));
    }
    assert_eq!(env.ledger.by_tx_queries(), queries);
}

#[tokio::test]
async fn withdraw_requires_outbid_status() {
    let env = setup();
    let seller = funded_wallet(&env, 300_000_000).await;

    let deployed = env
        .sdk
        .deploy_auction(&seller, "Clock", TEST_NOW_MS + HOUR_MS)
        .await
        .unwrap();
    let started = env
        .sdk
        .start_auction(&seller, &deployed.state, 10_000_000)
        .await
        .unwrap()
        .new_state
        .unwrap();

    let err = env.sdk.withdraw_bid(&seller, &started).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidAuctionStatus {
            expected: AuctionStatus::Outbid,
            found: AuctionStatus::Started
        }
    ));
}

#[tokio::test]
async fn only_seller_may_start() {
    let env = setup();
    let seller = funded_wallet(&env, 100_000_000).await;
    let other = funded_wallet(&env, 100_000_000).await;

    let deployed = env
        .sdk
        .deploy_auction(&seller, "Lamp", TEST_NOW_MS + HOUR_MS)
        .await
        .unwrap();
    let err = env
        .sdk
        .start_auction(&other, &deployed.state, 5_000_000)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authorization(_)));
}

#[tokio::test]
async fn concurrent_auctions_share_an_address() {
    let env = setup();
    let seller = funded_wallet(&env, 300_000_000).await;
    let deadline = TEST_NOW_MS + HOUR_MS;

    let a = env.sdk.deploy_auction(&seller, "A", deadline).await.unwrap();
    let b = env.sdk.deploy_auction(&seller, "B", deadline).await.unwrap();
    assert_eq!(a.output.output.address, b.output.output.address);

    env.sdk
        .start_auction(&seller, &b.state, 20_000_000)
        .await
        .unwrap();

    let not_started = env
        .sdk
        .list_auctions(|s| s.status == AuctionStatus::NotStarted)
        .await
        .unwrap();
    assert_eq!(not_started.len(), 1);
    assert_eq!(not_started[0].state.object, b"A".to_vec());

    let live = env
        .sdk
        .list_auctions(|s| s.status == AuctionStatus::Started)
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].utxo.coin(), 20_000_000);
}

#[tokio::test]
async fn stale_state_is_not_found() {
    let env = setup();
    let seller = funded_wallet(&env, 300_000_000).await;
    let first = funded_wallet(&env, 300_000_000).await;
    let second = funded_wallet(&env, 300_000_000).await;

    let deployed = env
        .sdk
        .deploy_auction(&seller, "Chair", TEST_NOW_MS + HOUR_MS)
        .await
        .unwrap();
    let started = env
        .sdk
        .start_auction(&seller, &deployed.state, 10_000_000)
        .await
        .unwrap()
        .new_state
        .unwrap();

    env.sdk
        .place_bid(&first, &started, 20_000_000)
        .await
        .unwrap();
    let err = env
        .sdk
        .place_bid(&second, &started, 30_000_000)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn end_runs_once_the_deadline_timer_fires() {
    let env = setup();
    env.ledger.follow_runtime_clock();
    let seller = funded_wallet(&env, 300_000_000).await;
    let deadline = TEST_NOW_MS + HOUR_MS;

    let deployed = env
        .sdk
        .deploy_auction(&seller, "Mirror", deadline)
        .await
        .unwrap();
    let started = env
        .sdk
        .start_auction(&seller, &deployed.state, 20_000_000)
        .await
        .unwrap()
        .new_state
        .unwrap();

    let early = env.sdk.end_auction(&seller, &started).await.unwrap_err();
    assert!(matches!(early, Error::Timing(_)));

    let remaining = deadline - env.sdk.now_ms();
    let timer = tokio::time::Instant::now();
    let ended = env
        .sdk
        .end_auction_at_deadline(&seller, &started)
        .await
        .unwrap();
    assert!(ended.new_state.is_none());
    assert!(timer.elapsed() >= Duration::from_millis(remaining));
    assert!(env.sdk.now_ms() >= deadline);
    assert!(env.sdk.list_auctions(|_| true).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn past_deadline_does_not_sleep() {
    let env = setup();
    env.ledger.follow_runtime_clock();
    let timer = tokio::time::Instant::now();
    env.sdk.wait_for_deadline(TEST_NOW_MS - HOUR_MS).await;
    assert_eq!(timer.elapsed(), Duration::ZERO);
}
