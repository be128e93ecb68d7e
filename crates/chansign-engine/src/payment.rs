//! Virtual payments: off-chain transfers between two registered clients.
//!
//! The sender signs the request like any other mutating call. Checks run in
//! this order: distinct parties, known sender, fresh nonce, positive amount,
//! sufficient funds, known receiver. The balance move and the nonce update
//! share the request's transaction.

use chansign_types::api::{VirtualPaymentRequest, VirtualPaymentResponse};

use crate::engine::{client_key, Processed};
use crate::{EngineError, Result, SigningEngine};

impl SigningEngine {
    /// Move virtual balance from the requesting client to `receiverPublicKey`.
    pub async fn virtual_payment(&self, request: VirtualPaymentRequest) -> Result<VirtualPaymentResponse> {
        let sender = client_key(&request.client_public_key)?;
        let receiver = client_key(&request.receiver_public_key)?;
        self.handle(&request, |conn, now| {
            if sender == receiver {
                return Err(EngineError::InputMismatch("sender and receiver are the same".into()));
            }
            self.keys.load(conn, &sender)?;
            let sender_bytes = sender.serialize();
            let account = self
                .ledger
                .account(conn, &sender_bytes)?
                .ok_or(EngineError::KeysNotFound)?;
            if request.nonce <= account.nonce {
                return Err(EngineError::InvalidNonce {
                    stored: account.nonce,
                    proposed: request.nonce,
                });
            }
            let amount = i64::try_from(request.amount_sat)
                .ok()
                .filter(|amount| *amount >= 1)
                .ok_or_else(|| {
                    EngineError::InputMismatch(format!("invalid amount {}", request.amount_sat))
                })?;
            if amount > account.virtual_balance {
                return Err(EngineError::InsufficientFunds {
                    available: account.virtual_balance,
                    required: request.amount_sat,
                });
            }
            self.keys.load(conn, &receiver)?;
            let receiver_bytes = receiver.serialize();
            if self.ledger.account(conn, &receiver_bytes)?.is_none() {
                return Err(EngineError::KeysNotFound);
            }

            let (sender_balance, receiver_balance) =
                self.ledger
                    .transfer(conn, &sender_bytes, &receiver_bytes, amount, now)?;
            self.ledger.record_nonce(conn, &sender_bytes, request.nonce, now)?;
            tracing::info!(
                sender = %sender,
                receiver = %receiver,
                amount_sat = request.amount_sat,
                nonce = request.nonce,
                "virtual payment"
            );
            Ok(Processed::reply(VirtualPaymentResponse {
                sender_balance,
                receiver_balance,
            }))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{harness, Harness};
    use chansign_crypto::keys::ServerKey;
    use chansign_db::queries::accounts;
    use chansign_types::api::KeyExchangeRequest;

    /// Register a second client and return its key.
    async fn register_peer(h: &Harness) -> ServerKey {
        let peer = ServerKey::generate();
        let mut request = KeyExchangeRequest {
            client_public_key: peer.public_key_bytes().to_vec(),
            timestamp: h.now,
            signature: Vec::new(),
        };
        crate::auth::sign_request(&peer, &mut request).expect("sign");
        h.engine.key_exchange(request).await.expect("peer key exchange");
        peer
    }

    async fn deposit(h: &Harness, client: &[u8], amount: i64) {
        let conn = h.engine.db.lock().await;
        accounts::credit(&conn, client, amount, h.now).expect("deposit");
    }

    fn pay(h: &Harness, receiver: &ServerKey, amount_sat: u64, nonce: u64, timestamp: u64) -> VirtualPaymentRequest {
        h.signed(VirtualPaymentRequest {
            client_public_key: h.client_bytes(),
            timestamp,
            receiver_public_key: receiver.public_key_bytes().to_vec(),
            amount_sat,
            nonce,
            signature: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_transfer_moves_balance() {
        let h = harness(500_000);
        h.exchange_keys().await;
        let peer = register_peer(&h).await;
        deposit(&h, &h.client_bytes(), 10_000).await;

        let response = h
            .engine
            .virtual_payment(pay(&h, &peer, 4_000, 1, h.now))
            .await
            .expect("pay");
        assert_eq!(
            response,
            VirtualPaymentResponse {
                sender_balance: 6_000,
                receiver_balance: 4_000,
            }
        );
        let conn = h.engine.db.lock().await;
        assert_eq!(accounts::find(&conn, &h.client_bytes()).expect("find").expect("sender").nonce, 1);
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let h = harness(500_000);
        h.exchange_keys().await;
        let peer = register_peer(&h).await;
        deposit(&h, &h.client_bytes(), 1_000).await;

        let err = h
            .engine
            .virtual_payment(pay(&h, &peer, 1_001, 1, h.now))
            .await
            .expect_err("overdraw");
        assert!(matches!(
            err,
            EngineError::InsufficientFunds { available: 1_000, required: 1_001 }
        ));

        // The failed attempt left both balances and the nonce alone.
        let conn = h.engine.db.lock().await;
        let sender = accounts::find(&conn, &h.client_bytes()).expect("find").expect("sender");
        assert_eq!((sender.virtual_balance, sender.nonce), (1_000, 0));
        assert_eq!(accounts::virtual_balance(&conn, &peer.public_key_bytes()).expect("receiver"), 0);
    }

    #[tokio::test]
    async fn test_nonce_replay_rejected() {
        let h = harness(500_000);
        h.exchange_keys().await;
        let peer = register_peer(&h).await;
        deposit(&h, &h.client_bytes(), 10_000).await;

        h.engine
            .virtual_payment(pay(&h, &peer, 100, 5, h.now))
            .await
            .expect("first");
        for (offset, nonce) in [(1, 5), (2, 4)] {
            let err = h
                .engine
                .virtual_payment(pay(&h, &peer, 100, nonce, h.now + offset))
                .await
                .expect_err("stale nonce");
            assert!(matches!(err, EngineError::InvalidNonce { stored: 5, .. }));
        }
        h.engine
            .virtual_payment(pay(&h, &peer, 100, 6, h.now + 3))
            .await
            .expect("next nonce");
    }

    #[tokio::test]
    async fn test_rejects_invalid_parties_and_amount() {
        let h = harness(500_000);
        h.exchange_keys().await;
        deposit(&h, &h.client_bytes(), 10_000).await;

        let err = h
            .engine
            .virtual_payment(pay(&h, &h.client, 10, 1, h.now))
            .await
            .expect_err("self");
        assert!(matches!(err, EngineError::InputMismatch(_)));

        let peer = register_peer(&h).await;
        let err = h
            .engine
            .virtual_payment(pay(&h, &peer, 0, 1, h.now + 1))
            .await
            .expect_err("zero");
        assert!(matches!(err, EngineError::InputMismatch(_)));

        let stranger = ServerKey::generate();
        let err = h
            .engine
            .virtual_payment(pay(&h, &stranger, 10, 1, h.now + 2))
            .await
            .expect_err("unknown receiver");
        assert!(matches!(err, EngineError::KeysNotFound));
    }
}
