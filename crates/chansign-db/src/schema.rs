//! SQL schema definitions.

/// Complete schema for the chansign v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Channel keys and addresses
-- ============================================================

CREATE TABLE IF NOT EXISTS key_pairs (
    client_public_key BLOB PRIMARY KEY,
    server_public_key BLOB NOT NULL,
    server_private_key BLOB NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS time_locked_addresses (
    address_hash BLOB PRIMARY KEY,
    client_public_key BLOB NOT NULL REFERENCES key_pairs(client_public_key),
    server_public_key BLOB NOT NULL,
    lock_time INTEGER NOT NULL,
    redeem_script BLOB NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tla_client ON time_locked_addresses(client_public_key);

-- ============================================================
-- Double-spend guard
-- ============================================================

CREATE TABLE IF NOT EXISTS burned_outputs (
    outpoint BLOB PRIMARY KEY,
    client_public_key BLOB NOT NULL,
    txid BLOB NOT NULL,
    burned_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_burned_at ON burned_outputs(burned_at);

CREATE TABLE IF NOT EXISTS spent_outputs (
    outpoint BLOB PRIMARY KEY,
    client_public_key BLOB NOT NULL,
    txid BLOB NOT NULL,
    inserted_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_spent_inserted ON spent_outputs(inserted_at);

CREATE TABLE IF NOT EXISTS signed_inputs (
    outpoint BLOB PRIMARY KEY,
    lock_time INTEGER NOT NULL,
    txid BLOB NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS replay_protection (
    client_public_key BLOB NOT NULL,
    endpoint TEXT NOT NULL,
    seen_date INTEGER NOT NULL,
    inserted_at INTEGER NOT NULL,
    PRIMARY KEY (client_public_key, endpoint, seen_date)
);

CREATE INDEX IF NOT EXISTS idx_replay_inserted ON replay_protection(inserted_at);

-- ============================================================
-- Ledger
-- ============================================================

CREATE TABLE IF NOT EXISTS accounts (
    client_public_key BLOB PRIMARY KEY REFERENCES key_pairs(client_public_key),
    virtual_balance INTEGER NOT NULL DEFAULT 0,
    nonce INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS signed_transactions (
    txid BLOB PRIMARY KEY,
    client_public_key BLOB NOT NULL,
    raw_tx BLOB NOT NULL,
    approved INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_signed_tx_client ON signed_transactions(client_public_key);

-- ============================================================
-- Server settings
-- ============================================================

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
