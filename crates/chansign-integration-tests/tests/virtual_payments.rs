//! Integration test: off-chain transfers between registered clients.
//!
//! 1. A funded sender pays a receiver and both balances move
//! 2. An overdraft is refused and leaves both balances alone
//! 3. A reused nonce is refused even under a fresh timestamp

use chansign_db::queries::accounts;
use chansign_engine::EngineError;
use chansign_integration_tests::{Client, Server};
use chansign_types::api::{BalanceRequest, VirtualPaymentRequest};
use chansign_types::current_timestamp;

async fn credit(server: &Server, client: &Client, amount: i64) {
    let conn = server.db.lock().await;
    accounts::credit(&conn, &client.public_key_bytes(), amount, current_timestamp()).expect("credit");
}

async fn virtual_balance(server: &Server, client: &Client) -> i64 {
    server
        .engine
        .balance(BalanceRequest {
            client_public_key: client.public_key_bytes(),
        })
        .await
        .expect("balance")
        .virtual_satoshis
}

async fn pay(
    server: &Server,
    sender: &mut Client,
    receiver: &Client,
    amount_sat: u64,
    nonce: u64,
) -> chansign_engine::Result<(i64, i64)> {
    let timestamp = sender.next_timestamp();
    let request = sender.signed(VirtualPaymentRequest {
        client_public_key: sender.public_key_bytes(),
        timestamp,
        receiver_public_key: receiver.public_key_bytes(),
        amount_sat,
        nonce,
        signature: Vec::new(),
    });
    let response = server.engine.virtual_payment(request).await?;
    Ok((response.sender_balance, response.receiver_balance))
}

async fn registered_pair(server: &Server) -> (Client, Client) {
    let mut alice = Client::new();
    let mut bob = Client::new();
    alice.exchange_keys(server).await;
    bob.exchange_keys(server).await;
    credit(server, &alice, 10_000).await;
    (alice, bob)
}

#[tokio::test]
async fn test_transfer_between_clients() {
    let server = Server::start();
    let (mut alice, bob) = registered_pair(&server).await;

    assert_eq!(pay(&server, &mut alice, &bob, 4_000, 1).await.expect("pay"), (6_000, 4_000));
    assert_eq!(pay(&server, &mut alice, &bob, 1_000, 2).await.expect("pay"), (5_000, 5_000));
    assert_eq!(virtual_balance(&server, &alice).await, 5_000);
    assert_eq!(virtual_balance(&server, &bob).await, 5_000);
}

#[tokio::test]
async fn test_overdraft_refused() {
    let server = Server::start();
    let (mut alice, bob) = registered_pair(&server).await;

    let err = pay(&server, &mut alice, &bob, 10_001, 1).await.expect_err("overdraft");
    assert!(matches!(
        err,
        EngineError::InsufficientFunds { available: 10_000, required: 10_001 }
    ));
    assert_eq!(virtual_balance(&server, &alice).await, 10_000);
    assert_eq!(virtual_balance(&server, &bob).await, 0);

    // The refused nonce is still unused.
    pay(&server, &mut alice, &bob, 10_000, 1).await.expect("whole balance");
}

#[tokio::test]
async fn test_reused_nonce_refused() {
    let server = Server::start();
    let (mut alice, bob) = registered_pair(&server).await;

    pay(&server, &mut alice, &bob, 100, 5).await.expect("first");
    for nonce in [5, 4] {
        let err = pay(&server, &mut alice, &bob, 100, nonce).await.expect_err("stale nonce");
        assert!(matches!(err, EngineError::InvalidNonce { stored: 5, .. }));
    }
    assert_eq!(virtual_balance(&server, &bob).await, 100);
}
