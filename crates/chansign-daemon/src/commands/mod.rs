//! JSON-RPC command handlers.
//!
//! Handlers decode `params` into the request payload, call the engine and
//! encode its response. Engine errors map to RPC errors through `From`.

pub mod channel;
pub mod payment;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::rpc::RpcError;

type Result = std::result::Result<Value, RpcError>;

fn params<T: DeserializeOwned>(params: Value) -> std::result::Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(&e.to_string()))
}

fn reply<T: Serialize>(response: T) -> Result {
    serde_json::to_value(response).map_err(|e| {
        tracing::error!(error = %e, "failed to encode response");
        RpcError::server_error()
    })
}
