use crate::models::{Commitment, LoadedAddresses, Network, Pubkey, RawTransaction, Signature};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// JSON-RPC error codes a healthy node can return transiently.
const RETRYABLE_RPC_CODES: [i64; 4] = [
    -32004, // block not available
    -32005, // node is behind
    -32007, // slot skipped or missing in long-term storage
    -32009, // slot missing in long-term storage
];

const MAX_BACKOFF_EXPONENT: u32 = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("transaction not found")]
    NotFound,

    #[error("transport failure after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected RPC response: {0}")]
    InvalidResponse(String),

    #[error("malformed transaction payload: {0}")]
    Malformed(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Transport { .. })
    }
}

/// Read-only access to finalized ledger transactions.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn fetch_transaction(
        &self,
        signature: &Signature,
        network: Network,
        commitment: Commitment,
    ) -> Result<RawTransaction, LedgerError>;

    async fn health(&self, network: Network) -> Result<(), LedgerError>;
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub mainnet_url: String,
    pub devnet_url: String,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl LedgerConfig {
    pub fn endpoint(&self, network: Network) -> &str {
        match network {
            Network::Mainnet => &self.mainnet_url,
            Network::Devnet => &self.devnet_url,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mainnet_url: "https://api.mainnet-beta.solana.com".to_string(),
            devnet_url: "https://api.devnet.solana.com".to_string(),
            request_timeout: Duration::from_secs(8),
            max_attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Outcome of a single HTTP round trip.
enum Attempt {
    Retry(String),
    Fail(LedgerError),
}

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedTransaction {
    slot: u64,
    block_time: Option<i64>,
    meta: Option<TransactionMeta>,
    /// `[payload, encoding]`
    transaction: (String, String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMeta {
    err: Option<Value>,
    pre_balances: Vec<u64>,
    post_balances: Vec<u64>,
    #[serde(default)]
    loaded_addresses: Option<UiLoadedAddresses>,
}

#[derive(Deserialize, Default)]
struct UiLoadedAddresses {
    #[serde(default)]
    writable: Vec<String>,
    #[serde(default)]
    readonly: Vec<String>,
}

impl EncodedTransaction {
    fn into_raw(self) -> Result<RawTransaction, LedgerError> {
        let meta = self.meta.ok_or(LedgerError::NotFound)?;

        let (payload, encoding) = self.transaction;
        if encoding != "base64" {
            return Err(LedgerError::Malformed(format!(
                "expected base64 encoding, node returned {}",
                encoding
            )));
        }
        let message_bytes = STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| LedgerError::Malformed(format!("invalid base64: {}", e)))?;

        let loaded = meta.loaded_addresses.unwrap_or_default();
        let parse_keys = |keys: Vec<String>| {
            keys.iter()
                .map(|k| k.parse::<Pubkey>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| LedgerError::Malformed(format!("invalid loaded address: {}", e)))
        };

        Ok(RawTransaction {
            slot: self.slot,
            block_time: self.block_time,
            err: meta.err.filter(|e| !e.is_null()),
            pre_balances: meta.pre_balances,
            post_balances: meta.post_balances,
            loaded_addresses: LoadedAddresses {
                writable: parse_keys(loaded.writable)?,
                readonly: parse_keys(loaded.readonly)?,
            },
            message_bytes,
        })
    }
}

/// JSON-RPC client for Solana nodes, one endpoint per network.
pub struct RpcLedgerClient {
    client: Client,
    config: LedgerConfig,
}

impl RpcLedgerClient {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::InvalidResponse(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Sends one JSON-RPC request, retrying transport-level failures with
    /// exponential backoff up to `max_attempts`.
    async fn call<T: DeserializeOwned>(
        &self,
        network: Network,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, LedgerError> {
        let url = self.config.endpoint(network);
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call_once(url, &body).await {
                Ok(result) => return Ok(result),
                Err(Attempt::Fail(e)) => return Err(e),
                Err(Attempt::Retry(message)) if attempt >= max_attempts => {
                    tracing::error!(
                        %network,
                        method,
                        attempts = attempt,
                        error = %message,
                        "RPC retries exhausted"
                    );
                    return Err(LedgerError::Transport {
                        attempts: attempt,
                        message,
                    });
                }
                Err(Attempt::Retry(message)) => {
                    let delay = self
                        .config
                        .backoff
                        .saturating_mul(1 << (attempt - 1).min(MAX_BACKOFF_EXPONENT));
                    tracing::warn!(
                        %network,
                        method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "RPC attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<Option<T>, Attempt> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Attempt::Retry(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(Attempt::Retry(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Attempt::Fail(LedgerError::Rpc {
                code: i64::from(status.as_u16()),
                message: text,
            }));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Attempt::Retry(e.to_string()))?;
        let envelope: RpcEnvelope<T> = serde_json::from_slice(&bytes)
            .map_err(|e| Attempt::Fail(LedgerError::InvalidResponse(e.to_string())))?;

        if let Some(error) = envelope.error {
            if RETRYABLE_RPC_CODES.contains(&error.code) {
                return Err(Attempt::Retry(format!("RPC error {}: {}", error.code, error.message)));
            }
            return Err(Attempt::Fail(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            }));
        }

        Ok(envelope.result)
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn fetch_transaction(
        &self,
        signature: &Signature,
        network: Network,
        commitment: Commitment,
    ) -> Result<RawTransaction, LedgerError> {
        let params = json!([
            signature.to_string(),
            {
                "encoding": "base64",
                "commitment": commitment.as_str(),
                "maxSupportedTransactionVersion": 0,
            }
        ]);

        let tx: EncodedTransaction = self
            .call(network, "getTransaction", params)
            .await?
            .ok_or(LedgerError::NotFound)?;

        tracing::debug!(%signature, %network, slot = tx.slot, "transaction fetched");
        tx.into_raw()
    }

    async fn health(&self, network: Network) -> Result<(), LedgerError> {
        let status: Option<String> = self.call(network, "getHealth", json!([])).await?;
        match status.as_deref() {
            Some("ok") => Ok(()),
            other => Err(LedgerError::InvalidResponse(format!(
                "node health: {:?}",
                other
            ))),
        }
    }
}
