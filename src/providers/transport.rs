//! Node transports: JSON-RPC 2.0 and REST over HTTP.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::trace;

use crate::error::{Result, WalletCoreError};
use crate::types::Chain;

/// How a provider reaches its node.
///
/// REST responses that are not JSON come back as `Value::String`; a REST
/// 404 comes back as `Value::Null`.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// JSON-RPC 2.0 call; returns the `result` member.
    async fn call(&self, method: &str, params: Value) -> Result<Value>;

    async fn get(&self, path: &str) -> Result<Value>;

    async fn post(&self, path: &str, body: Value) -> Result<Value>;
}

/// reqwest-backed transport for one node endpoint.
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: String,
    chain: Chain,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(chain: Chain, endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletCoreError::provider(chain, format!("HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            chain,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Value::Null);
        }
        let text = response
            .text()
            .await
            .map_err(|e| WalletCoreError::provider(self.chain, format!("reading response: {}", e)))?;
        if !status.is_success() {
            return Err(WalletCoreError::provider(
                self.chain,
                format!("HTTP {}: {}", status, text),
            ));
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(chain = %self.chain, method, id, "json-rpc call");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletCoreError::provider(self.chain, format!("{} failed: {}", method, e)))?;

        let body = self.read_body(response).await?;
        if let Some(error) = body.get("error") {
            return Err(WalletCoreError::provider(
                self.chain,
                format!("{} returned error: {}", method, error),
            ));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let response = self
            .http_client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| WalletCoreError::provider(self.chain, format!("GET {} failed: {}", path, e)))?;
        self.read_body(response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .http_client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletCoreError::provider(self.chain, format!("POST {} failed: {}", path, e)))?;
        self.read_body(response).await
    }
}

/// Canned-response transport for tests and offline runs.
///
/// Routes are keyed by JSON-RPC method name, or `"GET <path>"` /
/// `"POST <path>"` for REST. Unrouted calls fail with a provider error.
pub struct MockTransport {
    chain: Chain,
    routes: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<(String, Value)>>,
    unreachable: AtomicBool,
}

impl MockTransport {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn with(self, route: impl Into<String>, response: Value) -> Self {
        self.set(route, response);
        self
    }

    pub fn set(&self, route: impl Into<String>, response: Value) {
        let mut routes = self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        routes.insert(route.into(), response);
    }

    /// Fail every call as if the node were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Every routed call so far, with its params or body.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn respond(&self, route: String, payload: Value) -> Result<Value> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(WalletCoreError::provider(self.chain, "connection refused"));
        }
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((route.clone(), payload));
        let routes = self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        routes
            .get(&route)
            .cloned()
            .ok_or_else(|| WalletCoreError::provider(self.chain, format!("no mock route for {}", route)))
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.respond(method.to_string(), params)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.respond(format!("GET {}", path), Value::Null)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.respond(format!("POST {}", path), body)
    }
}
