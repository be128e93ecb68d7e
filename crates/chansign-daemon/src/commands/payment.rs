//! Signing, refunds, verification, aborts and virtual payments.

use std::sync::Arc;

use chansign_types::api::{
    AbortSignRequest, RefundRequest, SignRequest, VerifyRequest, VirtualPaymentRequest,
};
use serde_json::Value;

use super::{params, reply, Result};
use crate::DaemonState;

pub async fn sign(state: &Arc<DaemonState>, raw: Value) -> Result {
    let request: SignRequest = params(raw)?;
    reply(state.engine.sign(request).await?)
}

pub async fn refund(state: &Arc<DaemonState>, raw: Value) -> Result {
    let request: RefundRequest = params(raw)?;
    reply(state.engine.refund(request).await?)
}

/// `instant: false` in the result is the no-instant-payment outcome, not an
/// error; the transaction is still committed and broadcast.
pub async fn verify(state: &Arc<DaemonState>, raw: Value) -> Result {
    let request: VerifyRequest = params(raw)?;
    reply(state.engine.verify(request).await?)
}

pub async fn abort_sign(state: &Arc<DaemonState>, raw: Value) -> Result {
    let request: AbortSignRequest = params(raw)?;
    reply(state.engine.abort_sign(request).await?)
}

pub async fn virtual_payment(state: &Arc<DaemonState>, raw: Value) -> Result {
    let request: VirtualPaymentRequest = params(raw)?;
    reply(state.engine.virtual_payment(request).await?)
}
