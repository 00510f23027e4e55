use std::sync::Arc;
use std::time::Duration;

use gavelbet_sdk::testing::{
    MockLedger, TEST_NOW_MS, auction_validator, bet_validator, test_protocol_params,
};
use gavelbet_sdk::{
    BuildConfig, ChainBackend, Error, FinalizeInputs, GavelbetSdk, KeySigner, KeyWallet, Network,
    RetryPolicy, TxDraft, TxId, TxOutput, Value, Wallet, await_visible, collect_signatures,
    finalize, submit,
};

fn sdk_with(ledger: &Arc<MockLedger>, retry: RetryPolicy) -> GavelbetSdk {
    let chain: Arc<dyn ChainBackend> = ledger.clone();
    GavelbetSdk::new(chain, Network::Preview, auction_validator(), bet_validator())
        .unwrap()
        .with_retry_policy(retry)
        .with_clock(ledger.clone())
}

async fn wallet(ledger: &Arc<MockLedger>, lovelace: u64) -> KeyWallet {
    let w = KeyWallet::new(
        KeySigner::generate(&mut rand::thread_rng()),
        Network::Preview,
        ledger.clone(),
    );
    ledger.fund(w.address(), Value::lovelace(lovelace)).await;
    w
}

#[tokio::test]
async fn lagging_provider_is_polled_until_visible() {
    let ledger = Arc::new(MockLedger::new(Network::Preview));
    let sdk = sdk_with(&ledger, RetryPolicy::fixed(5, Duration::from_millis(1)));
    let seller = wallet(&ledger, 50_000_000).await;
    ledger.set_visibility_lag(3).await;

    sdk.deploy_auction(&seller, "Painting#1", TEST_NOW_MS + 60_000)
        .await
        .unwrap();
    assert_eq!(ledger.by_tx_queries(), 4);
}

#[tokio::test]
async fn visibility_gives_up_after_max_attempts() {
    let ledger = Arc::new(MockLedger::new(Network::Preview));
    let sdk = sdk_with(&ledger, RetryPolicy::fixed(3, Duration::from_millis(1)));
    let seller = wallet(&ledger, 50_000_000).await;
    ledger.set_visibility_lag(10).await;

    let err = sdk
        .deploy_auction(&seller, "Painting#1", TEST_NOW_MS + 60_000)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::VisibilityTimeout { attempts: 3, .. }));
    assert_eq!(ledger.by_tx_queries(), 3);
}

#[tokio::test]
async fn provider_errors_fail_fast() {
    let ledger = Arc::new(MockLedger::new(Network::Preview));
    ledger.set_query_failure(Some("provider down")).await;

    let policy = RetryPolicy::exponential(
        6,
        Duration::from_millis(1),
        2,
        Duration::from_millis(4),
    );
    let err = await_visible(&*ledger, &TxId([7; 32]), &policy)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Query(_)));
    assert_eq!(ledger.by_tx_queries(), 1);
}

#[tokio::test]
async fn unknown_transaction_times_out() {
    let ledger = Arc::new(MockLedger::new(Network::Preview));
    let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
    let err = await_visible(&*ledger, &TxId([7; 32]), &policy)
        .await
        .unwrap_err();
    match err {
        Error::VisibilityTimeout { tx_id, attempts } => {
            assert_eq!(tx_id, TxId([7; 32]));
            assert_eq!(attempts, 2);
        }
        other => panic!("expected VisibilityTimeout, got {other:?}"),
    }
}

/// Two transactions built from the same wallet output: the ledger accepts
/// the first and rejects the second.
#[tokio::test]
async fn double_spend_is_rejected() {
    let ledger = Arc::new(MockLedger::new(Network::Preview));
    let payer = wallet(&ledger, 20_000_000).await;
    let payee = KeySigner::generate(&mut rand::thread_rng()).enterprise_address(Network::Preview);

    let utxos = payer.get_spendable_outputs().await.unwrap();
    assert_eq!(utxos.len(), 1);
    let pp = test_protocol_params();
    let config = BuildConfig::default();
    let inputs = FinalizeInputs {
        wallet_utxos: &utxos,
        change_address: payer.address(),
        protocol_params: &pp,
        build_config: &config,
        network: Network::Preview,
        now_ms: TEST_NOW_MS,
    };

    let mut signed = Vec::new();
    for amount in [3_000_000, 4_000_000] {
        let mut draft = TxDraft::new();
        draft.pay_to(TxOutput::new(payee.clone(), Value::lovelace(amount)));
        let unsigned = finalize(&draft, &inputs).unwrap();
        signed.push(collect_signatures(&unsigned, &[&payer]).await.unwrap());
    }

    submit(&payer, &signed[0]).await.unwrap();
    let err = submit(&payer, &signed[1]).await.unwrap_err();
    assert!(matches!(err, Error::Submission(_)));
    assert_eq!(ledger.balance(&payee).await, 3_000_000);
}

#[tokio::test]
async fn ledger_refuses_unsigned_spends() {
    let ledger = Arc::new(MockLedger::new(Network::Preview));
    let payer = wallet(&ledger, 20_000_000).await;
    let stranger = KeySigner::generate(&mut rand::thread_rng());

    let utxos = payer.get_spendable_outputs().await.unwrap();
    let pp = test_protocol_params();
    let config = BuildConfig::default();
    let mut draft = TxDraft::new();
    draft.pay_to(TxOutput::new(
        stranger.enterprise_address(Network::Preview),
        Value::lovelace(5_000_000),
    ));
    let unsigned = finalize(
        &draft,
        &FinalizeInputs {
            wallet_utxos: &utxos,
            change_address: payer.address(),
            protocol_params: &pp,
            build_config: &config,
            network: Network::Preview,
            now_ms: TEST_NOW_MS,
        },
    )
    .unwrap();

    // The stranger's witness is valid but does not cover the payer's input.
    let err = collect_signatures(&unsigned, &[&stranger]).await.unwrap_err();
    assert!(matches!(err, Error::MissingSigner(_)));
}
