use std::sync::Arc;
use std::time::Duration;

use gavelbet_sdk::testing::{MockLedger, TEST_NOW_MS, auction_validator, bet_validator};
use gavelbet_sdk::{
    Address, BetState, ChainBackend, Error, GavelbetSdk, KeySigner, KeyWallet, MIN_DEPOSIT,
    Network, RetryPolicy, Value, find_by_state,
};

const WAGER: u64 = 1_000_000;
const HOUR_MS: u64 = 3_600_000;

struct Env {
    ledger: Arc<MockLedger>,
    sdk: GavelbetSdk,
    player1: KeyWallet,
    player2: KeySigner,
    oracle: KeySigner,
}

async fn setup() -> Env {
    let ledger = Arc::new(MockLedger::new(Network::Preview));
    let chain: Arc<dyn ChainBackend> = ledger.clone();
    let sdk = GavelbetSdk::new(chain.clone(), Network::Preview, auction_validator(), bet_validator())
        .unwrap()
        .with_retry_policy(RetryPolicy::fixed(5, Duration::from_millis(1)))
        .with_clock(ledger.clone());
    let player1 = KeyWallet::new(
        KeySigner::generate(&mut rand::thread_rng()),
        Network::Preview,
        chain,
    );
    ledger
        .fund(player1.address(), Value::lovelace(50_000_000))
        .await;
    Env {
        ledger,
        sdk,
        player1,
        player2: KeySigner::generate(&mut rand::thread_rng()),
        oracle: KeySigner::generate(&mut rand::thread_rng()),
    }
}

async fn deploy_and_join(env: &Env) -> BetState {
    let deployed = env
        .sdk
        .deploy_bet(
            &env.player1,
            env.oracle.public_key_hash(),
            env.player2.public_key_hash(),
            WAGER,
            TEST_NOW_MS + HOUR_MS,
        )
        .await
        .unwrap();
    assert!(!deployed.state.is_joined);
    assert_eq!(deployed.output.coin(), MIN_DEPOSIT);

    let joined = env
        .sdk
        .join_bet(&env.player1, &env.player2, &deployed.state)
        .await
        .unwrap();
    joined.new_state.unwrap()
}

fn address_of(signer: &KeySigner) -> Address {
    signer.enterprise_address(Network::Preview)
}

#[tokio::test]
async fn join_doubles_the_wager() {
    let env = setup().await;
    let joined = deploy_and_join(&env).await;

    let locked = find_by_state(&*env.ledger, env.sdk.bet_validator().address(), &joined)
        .await
        .unwrap();
    assert_eq!(locked.coin(), 2 * WAGER);
    let decoded: BetState = locked.decode_state().unwrap();
    assert!(decoded.is_joined);
    assert_eq!(decoded.player2, env.player2.public_key_hash());
}

#[tokio::test]
async fn win_pays_the_pot_and_closes_the_bet() {
    let env = setup().await;
    let joined = deploy_and_join(&env).await;

    let settled = env
        .sdk
        .settle_bet(
            &env.player1,
            &env.oracle,
            &joined,
            Some(env.player2.public_key_hash()),
        )
        .await
        .unwrap();
    assert_eq!(settled.winner, Some(env.player2.public_key_hash()));
    assert!(settled.new_state.is_none());

    assert_eq!(env.ledger.balance(&address_of(&env.player2)).await, 2 * WAGER);
    assert!(env.sdk.list_bets(|_| true).await.unwrap().is_empty());
}

#[tokio::test]
async fn oracle_draws_a_player() {
    let env = setup().await;
    let joined = deploy_and_join(&env).await;

    let settled = env
        .sdk
        .settle_bet(&env.player1, &env.oracle, &joined, None)
        .await
        .unwrap();
    let winner = settled.winner.unwrap();
    assert!(joined.is_player(&winner));
}

#[tokio::test]
async fn only_the_oracle_settles() {
    let env = setup().await;
    let joined = deploy_and_join(&env).await;

    let err = env
        .sdk
        .settle_bet(&env.player1, &env.player2, &joined, Some(joined.player1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authorization(_)));
}

#[tokio::test]
async fn join_checks_the_counterparty_key() {
    let env = setup().await;
    let deployed = env
        .sdk
        .deploy_bet(
            &env.player1,
            env.oracle.public_key_hash(),
            env.player2.public_key_hash(),
            WAGER,
            TEST_NOW_MS + HOUR_MS,
        )
        .await
        .unwrap();

    let err = env
        .sdk
        .join_bet(&env.player1, &env.oracle, &deployed.state)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authorization(_)));
}

#[tokio::test]
async fn timeout_waits_for_the_deadline() {
    let env = setup().await;
    let joined = deploy_and_join(&env).await;

    let queries = env.ledger.by_tx_queries();
    let err = env
        .sdk
        .timeout_bet(&env.player1, &env.player2, &joined)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timing(_)));
    assert_eq!(env.ledger.by_tx_queries(), queries);

    env.ledger.set_now_ms(joined.deadline);
    env.sdk
        .timeout_bet(&env.player1, &env.player2, &joined)
        .await
        .unwrap();
    assert_eq!(env.ledger.balance(&address_of(&env.player2)).await, WAGER);
    assert!(env.sdk.list_bets(|_| true).await.unwrap().is_empty());
}

#[tokio::test]
async fn win_before_join_is_rejected() {
    let env = setup().await;
    let deployed = env
        .sdk
        .deploy_bet(
            &env.player1,
            env.oracle.public_key_hash(),
            env.player2.public_key_hash(),
            WAGER,
            TEST_NOW_MS + HOUR_MS,
        )
        .await
        .unwrap();

    let err = env
        .sdk
        .settle_bet(&env.player1, &env.oracle, &deployed.state, Some(deployed.state.player1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BetNotJoined));
}

#[tokio::test(start_paused = true)]
async fn timeout_runs_once_the_deadline_timer_fires() {
    let env = setup().await;
    env.ledger.follow_runtime_clock();
    let joined = deploy_and_join(&env).await;

    let early = env
        .sdk
        .timeout_bet(&env.player1, &env.player2, &joined)
        .await
        .unwrap_err();
    assert!(matches!(early, Error::Timing(_)));

    let remaining = joined.deadline - env.sdk.now_ms();
    let timer = tokio::time::Instant::now();
    env.sdk
        .timeout_bet_at_deadline(&env.player1, &env.player2, &joined)
        .await
        .unwrap();
    assert!(timer.elapsed() >= Duration::from_millis(remaining));
    assert_eq!(env.ledger.balance(&address_of(&env.player2)).await, WAGER);
    assert!(env.sdk.list_bets(|_| true).await.unwrap().is_empty());
}
