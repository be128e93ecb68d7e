//! Per-client server key pairs.
//!
//! Each client public key maps to exactly one server key pair, generated on
//! key exchange and never replaced. The private half never leaves the server.

use bitcoin::secp256k1::PublicKey;
use chansign_crypto::keys::ServerKey;
use chansign_db::queries::keys;
use chansign_db::DbError;
use chansign_types::records::KeyPairRecord;
use rusqlite::Connection;
use zeroize::Zeroizing;

use crate::{EngineError, Result};

/// Key custody over the `key_pairs` table.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyStore;

impl KeyStore {
    /// Generate and store a server key for `client`.
    pub fn provision(&self, conn: &Connection, client: &PublicKey, now: u64) -> Result<ServerKey> {
        let client_bytes = client.serialize();
        if keys::find(conn, &client_bytes)?.is_some() {
            return Err(EngineError::KeyAlreadyExists);
        }

        let server = ServerKey::generate();
        let record = KeyPairRecord {
            client_public_key: client_bytes.to_vec(),
            server_public_key: server.public_key_bytes().to_vec(),
            server_private_key: Zeroizing::new(server.secret_bytes().to_vec()),
            created_at: now,
        };
        keys::insert(conn, &record).map_err(|e| match e {
            DbError::Constraint(_) => EngineError::KeyAlreadyExists,
            other => EngineError::Db(other),
        })?;
        tracing::info!(client = %client, server = %server.public_key(), "key pair provisioned");
        Ok(server)
    }

    /// The server key for `client`.
    pub fn load(&self, conn: &Connection, client: &PublicKey) -> Result<ServerKey> {
        let record = keys::find(conn, &client.serialize())?.ok_or(EngineError::KeysNotFound)?;
        ServerKey::from_stored(&record.server_private_key, &record.server_public_key).map_err(|e| {
            tracing::error!(client = %client, error = %e, "stored key pair is corrupt");
            EngineError::Internal("stored key pair is corrupt".into())
        })
    }
}
