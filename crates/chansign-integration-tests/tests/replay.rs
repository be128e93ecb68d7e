//! Integration test: request skew, authentication, idempotency and replay
//! protection.

use chansign_engine::{EngineConfig, EngineError};
use chansign_guard::OutpointState;
use chansign_integration_tests::{destination, fund, Client, Server};
use chansign_script::ChannelScript;
use chansign_types::api::{KeyExchangeRequest, SignRequest};
use chansign_types::{current_timestamp, DAY_SECS};

fn payment(client: &Client, timestamp: u64, destination: &str, amount_sat: u64) -> SignRequest {
    client.signed(SignRequest {
        client_public_key: client.public_key_bytes(),
        timestamp,
        destination: Some(destination.to_string()),
        amount_sat: Some(amount_sat),
        ..SignRequest::default()
    })
}

#[tokio::test]
async fn test_timestamp_outside_window_rejected() {
    let server = Server::start();
    let client = Client::new();
    let now = current_timestamp();

    for timestamp in [now - 2 * DAY_SECS, now + 2 * DAY_SECS] {
        let err = server
            .engine
            .key_exchange(client.signed(KeyExchangeRequest {
                client_public_key: client.public_key_bytes(),
                timestamp,
                signature: Vec::new(),
            }))
            .await
            .expect_err("outside skew window");
        assert!(matches!(err, EngineError::TimeMismatch { .. }));
    }
}

#[tokio::test]
async fn test_millisecond_timestamp_accepted() {
    let server = Server::start();
    let client = Client::new();
    server
        .engine
        .key_exchange(client.signed(KeyExchangeRequest {
            client_public_key: client.public_key_bytes(),
            timestamp: current_timestamp() * 1000,
            signature: Vec::new(),
        }))
        .await
        .expect("milliseconds");
}

#[tokio::test]
async fn test_retry_returns_cached_response() {
    let server = Server::start();
    let mut client = Client::new();
    let multisig = client.exchange_keys(&server).await;
    let outpoint = fund(&server.wallet, 1, 100_000, &ChannelScript::Multisig(multisig));

    let timestamp = client.next_timestamp();
    let to = destination();
    let first = server
        .engine
        .sign(payment(&client, timestamp, &to, 40_000))
        .await
        .expect("first");
    let retry = server
        .engine
        .sign(payment(&client, timestamp, &to, 40_000))
        .await
        .expect("retry");
    assert_eq!(first, retry);
    assert!(matches!(server.state(&outpoint).await, OutpointState::Burned { .. }));

    let err = server
        .engine
        .sign(payment(&client, timestamp, &to, 41_000))
        .await
        .expect_err("same timestamp, different body");
    assert!(matches!(err, EngineError::ReplayDetected));
}

#[tokio::test]
async fn test_replay_after_cache_eviction() {
    let server = Server::with_config(EngineConfig {
        cache_capacity: 1,
        ..EngineConfig::default()
    });
    let mut client = Client::new();
    let multisig = client.exchange_keys(&server).await;
    let script = ChannelScript::Multisig(multisig);
    fund(&server.wallet, 1, 100_000, &script);
    fund(&server.wallet, 2, 100_000, &script);

    let to = destination();
    let t1 = client.next_timestamp();
    let t2 = client.next_timestamp();
    server
        .engine
        .sign(payment(&client, t1, &to, 40_000))
        .await
        .expect("first");
    server
        .engine
        .sign(payment(&client, t2, &to, 40_000))
        .await
        .expect("second evicts first");

    let err = server
        .engine
        .sign(payment(&client, t1, &to, 40_000))
        .await
        .expect_err("replayed");
    assert!(matches!(err, EngineError::ReplayDetected));
}

#[tokio::test]
async fn test_failed_request_is_not_cached() {
    let server = Server::start();
    let mut client = Client::new();
    let multisig = client.exchange_keys(&server).await;

    let to = destination();
    let timestamp = client.next_timestamp();
    let err = server
        .engine
        .sign(payment(&client, timestamp, &to, 40_000))
        .await
        .expect_err("unfunded");
    assert!(matches!(err, EngineError::NotEnoughCoins { .. }));

    fund(&server.wallet, 1, 100_000, &ChannelScript::Multisig(multisig));
    server
        .engine
        .sign(payment(&client, timestamp, &to, 40_000))
        .await
        .expect("retry after funding");
}

#[tokio::test]
async fn test_forged_signature_consumes_nothing() {
    let server = Server::start();
    let mut client = Client::new();
    let multisig = client.exchange_keys(&server).await;
    let outpoint = fund(&server.wallet, 1, 100_000, &ChannelScript::Multisig(multisig));

    // Signed by a stranger but naming the client's key.
    let stranger = Client::new();
    let timestamp = client.next_timestamp();
    let to = destination();
    let mut forged = payment(&client, timestamp, &to, 40_000);
    forged.signature = stranger.signed(forged.clone()).signature;
    let err = server.engine.sign(forged).await.expect_err("forged");
    assert!(matches!(err, EngineError::InvalidRequestSignature(_)));
    assert_eq!(server.state(&outpoint).await, OutpointState::Free);

    // The timestamp was not used up by the forgery.
    server
        .engine
        .sign(payment(&client, timestamp, &to, 40_000))
        .await
        .expect("genuine request");
}
