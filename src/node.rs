//! JSON-RPC client for the bitcoind node
//!
//! Provides access to the four node operations autosend consumes:
//! - `validateaddress` (rule validation)
//! - `setaccount` (one-time account registration at rule creation)
//! - `getbalance` (trigger evaluation)
//! - `sendmany` (atomic batched payout)

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::NodeConnection;
use crate::error::{Error, Result};

/// Result of a `validateaddress` call
#[derive(Debug, Clone, Deserialize)]
pub struct AddressInfo {
    #[serde(rename = "isvalid")]
    pub is_valid: bool,
    #[serde(rename = "ismine", default)]
    pub is_mine: bool,
}

/// Node operations consumed by the rule model and engine.
///
/// The engine only depends on this trait so tests can run against a
/// recording mock instead of a live node.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn validate_address(&self, address: &str) -> Result<AddressInfo>;

    /// Label an address as its own account so `getbalance`/`sendmany`
    /// can address it by name.
    async fn set_account(&self, address: &str, label: &str) -> Result<()>;

    /// Balance of an account, in the node's native unit.
    async fn get_balance(&self, account: &str) -> Result<Decimal>;

    /// Pay every destination from one account in a single transaction.
    /// Returns the transaction id.
    async fn send_many(
        &self,
        from_account: &str,
        amounts: &BTreeMap<String, Decimal>,
    ) -> Result<String>;
}

/// bitcoind JSON-RPC client
pub struct BitcoindClient {
    client: Client,
    url: String,
    user: String,
    pass: String,
    timeout_ms: u64,
}

impl BitcoindClient {
    /// Create a client from connection parameters
    pub fn new(conn: &NodeConnection) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(conn.timeout_ms))
            .build()
            .map_err(|e| Error::RpcConnection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("http://{}:{}/", conn.host, conn.port),
            user: conn.user.clone(),
            pass: conn.pass.clone(),
            timeout_ms: conn.timeout_ms,
        })
    }

    /// Issue a JSON-RPC call and unwrap the response envelope
    async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T> {
        self.call_opt(method, params)
            .await?
            .ok_or_else(|| Error::Rpc(format!("No result in {} response", method)))
    }

    /// Like [`call`](Self::call), for methods whose success result is null
    async fn call_opt<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let request = serde_json::json!({
            "jsonrpc": "1.0",
            "id": "autosend",
            "method": method,
            "params": params,
        });

        debug!("Calling {} on {}", method, self.url);

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.pass))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::RpcTimeout(self.timeout_ms)
                } else if e.is_connect() {
                    Error::RpcConnection(e.to_string())
                } else {
                    Error::Rpc(format!("{} request failed: {}", method, e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Rpc(format!("Failed to read {} response: {}", method, e)))?;

        let rpc_response: RpcResponse<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                Error::Serialization(format!("Failed to parse {} response: {}", method, e))
            } else {
                Error::Rpc(format!("Node returned HTTP {}: {}", status, body))
            }
        })?;

        if let Some(error) = rpc_response.error {
            return Err(Error::Rpc(format!(
                "{} failed: {} (code {})",
                method, error.message, error.code
            )));
        }

        Ok(rpc_response.result)
    }
}

#[async_trait]
impl NodeRpc for BitcoindClient {
    async fn validate_address(&self, address: &str) -> Result<AddressInfo> {
        self.call("validateaddress", serde_json::json!([address]))
            .await
    }

    async fn set_account(&self, address: &str, label: &str) -> Result<()> {
        // setaccount returns null on success
        let _: Option<serde_json::Value> = self
            .call_opt("setaccount", serde_json::json!([address, label]))
            .await?;
        Ok(())
    }

    async fn get_balance(&self, account: &str) -> Result<Decimal> {
        self.call("getbalance", serde_json::json!([account])).await
    }

    async fn send_many(
        &self,
        from_account: &str,
        amounts: &BTreeMap<String, Decimal>,
    ) -> Result<String> {
        self.call("sendmany", sendmany_params(from_account, amounts)?)
            .await
    }
}

/// Build the `sendmany` parameter list with numeric amounts.
///
/// bitcoind rejects string amounts, so each decimal goes on the wire as an
/// arbitrary-precision JSON number.
fn sendmany_params(
    from_account: &str,
    amounts: &BTreeMap<String, Decimal>,
) -> Result<serde_json::Value> {
    #[derive(serde::Serialize)]
    struct Amount(#[serde(with = "rust_decimal::serde::arbitrary_precision")] Decimal);

    let mut map = serde_json::Map::with_capacity(amounts.len());
    for (address, amount) in amounts {
        map.insert(address.clone(), serde_json::to_value(Amount(*amount))?);
    }
    Ok(serde_json::json!([from_account, map]))
}

// bitcoind wraps every response in this envelope. Errors come back with
// HTTP 500 but still carry the envelope, so parse the body either way.
#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
    id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}
