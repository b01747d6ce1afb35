//! JSON-RPC registry client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ledgerid_core::Address;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::record::{OnChainRecord, RegistryProfile};

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The registry endpoint could not be reached, or the call timed out.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// The transaction was rejected (reverted) by the contract.
    #[error("registry rejected the transaction: {0}")]
    Rejected(String),

    /// The input was invalid; nothing was sent to the registry.
    #[error("invalid registry input: {0}")]
    InvalidInput(String),
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RegistryError::Unavailable("request timed out".to_string())
        } else {
            RegistryError::Unavailable(err.to_string())
        }
    }
}

/// Receipt of an accepted registry transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    #[serde(default)]
    pub block_number: Option<u64>,
}

/// The four-operation registry contract interface.
///
/// Every call is one blocking attempt with a bounded cost budget; no
/// implementation may retry internally.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Register a new identity under the wallet address.
    async fn register(
        &self,
        wallet: &Address,
        profile: &RegistryProfile,
    ) -> Result<TxReceipt, RegistryError>;

    /// Update the record stored under the wallet address.
    async fn update(
        &self,
        wallet: &Address,
        profile: &RegistryProfile,
    ) -> Result<TxReceipt, RegistryError>;

    /// Fetch the record under the wallet address.
    ///
    /// `Ok(None)` means the chain has no record; that is a legitimate state,
    /// not an error: the chain may simply not have caught up.
    async fn fetch(&self, wallet: &Address) -> Result<Option<OnChainRecord>, RegistryError>;

    /// Check whether any record exists under the wallet address.
    async fn exists(&self, wallet: &Address) -> Result<bool, RegistryError>;
}

/// Configuration for the HTTP registry client.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// JSON-RPC endpoint of the registry node.
    pub rpc_url: String,
    /// Deployed registry contract address.
    pub contract: Address,
    /// Gas budget attached to write operations.
    pub gas_limit: u64,
    /// Per-call timeout. A call that exceeds it maps to `Unavailable`.
    pub timeout: Duration,
}

impl RegistryConfig {
    /// Default gas budget for registry writes.
    pub const DEFAULT_GAS_LIMIT: u64 = 3_000_000;

    /// Default per-call timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(rpc_url: impl Into<String>, contract: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract,
            gas_limit: Self::DEFAULT_GAS_LIMIT,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC client over the registry contract.
///
/// One owned instance is constructed at process start with its contract
/// address already resolved, and passed explicitly to whoever needs it.
pub struct HttpRegistryClient {
    http: reqwest::Client,
    config: RegistryConfig,
    request_id: AtomicU64,
}

impl HttpRegistryClient {
    /// Create a client from resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the HTTP client cannot be constructed.
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(RegistryError::from)?;

        Ok(Self {
            http,
            config,
            request_id: AtomicU64::new(1),
        })
    }

    /// The contract address this client talks to.
    pub fn contract(&self) -> &Address {
        &self.config.contract
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, RegistryError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Unavailable(format!(
                "registry endpoint returned {status}: {body}"
            )));
        }

        let body: RpcResponse<T> = response.json().await?;

        if let Some(err) = body.error {
            tracing::debug!(code = err.code, message = %err.message, method, "registry call rejected");
            return Err(RegistryError::Rejected(err.message));
        }
        Ok(body.result)
    }

    fn write_params(&self, wallet: &Address, profile: &RegistryProfile) -> serde_json::Value {
        json!({
            "contract": self.config.contract,
            "wallet": wallet,
            "username": profile.username,
            "email": profile.email,
            "fullName": profile.full_name,
            "role": profile.role,
            "gas": self.config.gas_limit,
        })
    }
}

#[async_trait]
impl Registry for HttpRegistryClient {
    async fn register(
        &self,
        wallet: &Address,
        profile: &RegistryProfile,
    ) -> Result<TxReceipt, RegistryError> {
        let receipt: TxReceipt = self
            .call("registry_register", self.write_params(wallet, profile))
            .await?
            .ok_or_else(|| {
                RegistryError::Rejected("registry returned no receipt".to_string())
            })?;
        tracing::debug!(wallet = %wallet, tx_hash = %receipt.tx_hash, "registered on chain");
        Ok(receipt)
    }

    async fn update(
        &self,
        wallet: &Address,
        profile: &RegistryProfile,
    ) -> Result<TxReceipt, RegistryError> {
        let receipt: TxReceipt = self
            .call("registry_update", self.write_params(wallet, profile))
            .await?
            .ok_or_else(|| {
                RegistryError::Rejected("registry returned no receipt".to_string())
            })?;
        tracing::debug!(wallet = %wallet, tx_hash = %receipt.tx_hash, "updated on chain");
        Ok(receipt)
    }

    async fn fetch(&self, wallet: &Address) -> Result<Option<OnChainRecord>, RegistryError> {
        // A null result is "no record", not an error.
        self.call(
            "registry_get",
            json!({ "contract": self.config.contract, "wallet": wallet }),
        )
        .await
    }

    async fn exists(&self, wallet: &Address) -> Result<bool, RegistryError> {
        let exists: bool = self
            .call(
                "registry_exists",
                json!({ "contract": self.config.contract, "wallet": wallet }),
            )
            .await?
            .unwrap_or(false);
        Ok(exists)
    }
}
