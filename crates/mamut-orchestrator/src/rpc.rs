//! Minimal JSON-RPC client for component endpoints.

use crate::clock::Clock;
use crate::error::{OrchestratorError, Result};
use crate::jwt::JwtSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Credentials for authenticated endpoints.
#[derive(Clone, Debug)]
pub struct RpcAuth {
    /// Shared engine secret.
    pub secret: JwtSecret,
    /// Clock used for the `iat` claim.
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client bound to one endpoint URL.
#[derive(Clone, Debug)]
pub struct RpcClient {
    url: String,
    http: reqwest::Client,
    auth: Option<RpcAuth>,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    /// Creates a client for `url`.
    pub fn new(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            http,
            auth: None,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Signs every request with a fresh bearer token.
    pub fn with_auth(mut self, auth: RpcAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// The endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns true if requests carry a bearer token.
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    /// Calls `method` and decodes its result.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(url = %self.url, method, id, "rpc call");

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(auth) = &self.auth {
            let token = auth.secret.bearer_token(auth.clock.unix_secs())?;
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OrchestratorError::rpc(&self.url, method, e))?;
        let decoded: RpcResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::rpc(&self.url, method, e))?;

        if let Some(err) = decoded.error {
            return Err(OrchestratorError::rpc(
                &self.url,
                method,
                format!("code {}: {}", err.code, err.message),
            ));
        }
        let result = decoded.result.unwrap_or(Value::Null);
        Ok(serde_json::from_value(result)?)
    }
}
