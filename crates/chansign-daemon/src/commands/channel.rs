//! Channel setup and balance.

use std::sync::Arc;

use chansign_types::api::{BalanceRequest, KeyExchangeRequest, TimeLockedAddressRequest};
use serde_json::Value;

use super::{params, reply, Result};
use crate::DaemonState;

pub async fn key_exchange(state: &Arc<DaemonState>, raw: Value) -> Result {
    let request: KeyExchangeRequest = params(raw)?;
    reply(state.engine.key_exchange(request).await?)
}

pub async fn create_time_locked_address(state: &Arc<DaemonState>, raw: Value) -> Result {
    let request: TimeLockedAddressRequest = params(raw)?;
    reply(state.engine.create_time_locked_address(request).await?)
}

/// Read-only; no timestamp or replay check.
pub async fn balance(state: &Arc<DaemonState>, raw: Value) -> Result {
    let request: BalanceRequest = params(raw)?;
    reply(state.engine.balance(request).await?)
}
