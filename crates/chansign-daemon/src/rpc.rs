//! JSON-RPC 2.0 over a Unix socket.
//!
//! One request per line, one response per line. Connections are served
//! concurrently; the engine serializes anything that touches channel state.

use std::path::PathBuf;
use std::sync::Arc;

use chansign_engine::{EngineError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::DaemonState;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// Must be "2.0"; not enforced.
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object. `message` is the stable upper-snake-case name.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: "INVALID_PARAMS".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Generic server fault. Carries no detail.
    pub fn server_error() -> Self {
        Self {
            code: -32603,
            message: "SERVER_ERROR".to_string(),
            data: None,
        }
    }
}

/// Numeric code of a client-facing engine error.
fn engine_code(err: &EngineError) -> i32 {
    match err {
        EngineError::KeysNotFound => -32100,
        EngineError::KeyAlreadyExists => -32101,
        EngineError::AddressEmpty => -32102,
        EngineError::InputMismatch(_) => -32103,
        EngineError::NotEnoughCoins { .. } => -32104,
        EngineError::SignatureError(_) => -32105,
        EngineError::BurnedOutputs(_) => -32106,
        EngineError::LockTimeRegression { .. } => -32107,
        EngineError::InvalidLockTime(_) => -32108,
        EngineError::InvalidPublicKey(_) => -32109,
        EngineError::ReplayDetected => -32110,
        EngineError::TimeMismatch { .. } => -32111,
        EngineError::InvalidNonce { .. } => -32112,
        EngineError::InsufficientFunds { .. } => -32113,
        EngineError::InvalidRequestSignature(_) => -32114,
        EngineError::Wallet(_)
        | EngineError::Db(_)
        | EngineError::Serialization(_)
        | EngineError::Internal(_) => -32603,
    }
}

impl From<EngineError> for RpcError {
    fn from(err: EngineError) -> Self {
        if err.kind() == ErrorKind::Internal {
            error!(error = %err, "request failed with internal error");
            return Self::server_error();
        }
        let data = match &err {
            EngineError::NotEnoughCoins { available, required } => {
                serde_json::json!({"available": available, "required": required})
            }
            EngineError::LockTimeRegression { stored, proposed } => {
                serde_json::json!({"stored": stored, "proposed": proposed})
            }
            EngineError::InvalidNonce { stored, proposed } => {
                serde_json::json!({"stored": stored, "proposed": proposed})
            }
            EngineError::InsufficientFunds { available, required } => {
                serde_json::json!({"available": available, "required": required})
            }
            other => serde_json::json!({"detail": other.to_string()}),
        };
        Self {
            code: engine_code(&err),
            message: err.code().to_string(),
            data: Some(data),
        }
    }
}

pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Accept connections until the task is dropped.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = ?self.socket_path, "JSON-RPC server listening");

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!(error = %e, "connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                }
            }
        }
    }
}

async fn handle_connection(state: Arc<DaemonState>, stream: tokio::net::UnixStream) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch_request(&state, request).await,
            Err(_) => RpcResponse::error(Value::Null, RpcError::parse_error()),
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Route a request to its command handler.
pub async fn dispatch_request(state: &Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();
    debug!(method, "dispatching");

    let params = request.params;
    let result = match method {
        "key_exchange" => commands::channel::key_exchange(state, params).await,
        "create_time_locked_address" => commands::channel::create_time_locked_address(state, params).await,
        "balance" => commands::channel::balance(state, params).await,
        "sign" => commands::payment::sign(state, params).await,
        "refund" => commands::payment::refund(state, params).await,
        "verify" => commands::payment::verify(state, params).await,
        "abort_sign" => commands::payment::abort_sign(state, params).await,
        "virtual_payment" => commands::payment::virtual_payment(state, params).await,
        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use chansign_crypto::keys::ServerKey;
    use chansign_engine::auth::sign_request;
    use chansign_engine::wallet::MemoryWallet;
    use chansign_types::api::{KeyExchangeRequest, SignedRequest, VirtualPaymentRequest};
    use serde_json::json;

    fn state() -> (Arc<DaemonState>, tokio::sync::broadcast::Sender<()>) {
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
        let conn = chansign_db::open_memory().expect("open test db");
        let (state, _worker) = DaemonState::new(
            DaemonConfig::default(),
            conn,
            Arc::new(MemoryWallet::new(500_000)),
            shutdown_tx.clone(),
        );
        (Arc::new(state), shutdown_tx)
    }

    fn request(method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(7),
            method: method.to_string(),
            params,
        }
    }

    fn signed_params<R: SignedRequest>(key: &ServerKey, mut request: R) -> Value {
        sign_request(key, &mut request).expect("sign request");
        serde_json::to_value(request).expect("encode request")
    }

    fn key_exchange(key: &ServerKey, timestamp: u64) -> Value {
        signed_params(
            key,
            KeyExchangeRequest {
                client_public_key: key.public_key_bytes().to_vec(),
                timestamp,
                signature: Vec::new(),
            },
        )
    }

    #[test]
    fn test_engine_error_codes() {
        let err = RpcError::from(EngineError::BurnedOutputs("x:0".into()));
        assert_eq!(err.code, -32106);
        assert_eq!(err.message, "BURNED_OUTPUTS");

        let err = RpcError::from(EngineError::TimeMismatch { declared: 1, now: 2 });
        assert_eq!(err.code, -32111);

        let err = RpcError::from(EngineError::NotEnoughCoins { available: 5, required: 9 });
        assert_eq!(err.data, Some(json!({"available": 5, "required": 9})));

        let err = RpcError::from(EngineError::InsufficientFunds { available: -3, required: 9 });
        assert_eq!(err.code, -32113);
        assert_eq!(err.data, Some(json!({"available": -3, "required": 9})));

        let err = RpcError::from(EngineError::InvalidNonce { stored: 4, proposed: 4 });
        assert_eq!((err.code, err.message.as_str()), (-32112, "INVALID_NONCE"));
    }

    #[test]
    fn test_internal_error_is_opaque() {
        let err = RpcError::from(EngineError::Internal("disk on fire".into()));
        assert_eq!(err, RpcError::server_error());
        assert!(err.data.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (state, _shutdown) = state();
        let response = dispatch_request(&state, request("get_wallet_balance", json!({}))).await;
        assert_eq!(response.error.map(|e| e.code), Some(-32601));
        assert_eq!(response.id, json!(7));
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let (state, _shutdown) = state();
        let response = dispatch_request(&state, request("key_exchange", json!({"timestamp": 1}))).await;
        assert_eq!(response.error.map(|e| e.code), Some(-32602));
    }

    #[tokio::test]
    async fn test_key_exchange_then_balance() {
        let (state, _shutdown) = state();
        let client = ServerKey::generate();
        let now = chansign_types::current_timestamp();
        let response = dispatch_request(&state, request("key_exchange", key_exchange(&client, now))).await;
        let result = response.result.expect("key exchange result");
        assert_eq!(result["serverPublicKey"].as_str().map(str::len), Some(66));

        let client_hex = hex::encode(client.public_key_bytes());
        let response = dispatch_request(
            &state,
            request("balance", json!({"clientPublicKey": client_hex})),
        )
        .await;
        let result = response.result.expect("balance result");
        assert_eq!(result["totalSatoshis"], json!(0));

        let response =
            dispatch_request(&state, request("key_exchange", key_exchange(&client, now + 1))).await;
        let error = response.error.expect("second exchange fails");
        assert_eq!(error.code, -32101);
        assert_eq!(error.message, "KEY_ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_unsigned_request_rejected() {
        let (state, _shutdown) = state();
        let client = ServerKey::generate();
        let now = chansign_types::current_timestamp();
        let mut params = key_exchange(&client, now);
        params.as_object_mut().expect("object").remove("signature");

        let response = dispatch_request(&state, request("key_exchange", params)).await;
        let error = response.error.expect("unsigned");
        assert_eq!(error.code, -32114);
        assert_eq!(error.message, "INVALID_REQUEST_SIGNATURE");
    }

    #[tokio::test]
    async fn test_virtual_payment_is_dispatched() {
        let (state, _shutdown) = state();
        let sender = ServerKey::generate();
        let receiver = ServerKey::generate();
        let now = chansign_types::current_timestamp();
        for key in [&sender, &receiver] {
            let response = dispatch_request(&state, request("key_exchange", key_exchange(key, now))).await;
            assert!(response.error.is_none());
        }

        let payment = signed_params(
            &sender,
            VirtualPaymentRequest {
                client_public_key: sender.public_key_bytes().to_vec(),
                timestamp: now,
                receiver_public_key: receiver.public_key_bytes().to_vec(),
                amount_sat: 500,
                nonce: 1,
                signature: Vec::new(),
            },
        );
        let response = dispatch_request(&state, request("virtual_payment", payment)).await;
        let error = response.error.expect("empty account");
        assert_eq!(error.code, -32113);
        assert_eq!(error.data, Some(json!({"available": 0, "required": 500})));
    }
}
