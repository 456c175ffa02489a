use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {0} from {1}")]
    Status(u16, String),

    #[error("Rate limited after {0} backoff attempts")]
    RateLimited(u32),

    #[error("Retries exhausted: {0}")]
    RetriesExhausted(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Event GUID as the chain reports it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventGuid {
    #[serde(default)]
    pub creation_number: String,
    #[serde(default)]
    pub account_address: String,
}

/// A raw chain event as fetched from the events endpoint, before
/// classification into a typed payload
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub event_type: String,
    pub guid: Option<EventGuid>,
    pub sequence_number: Option<i64>,
    pub transaction_hash: Option<String>,
    pub block_height: u64,
    pub timestamp: i64,
    pub data: Value,
}

/// Narrow chain-RPC contract the poller and resolver consume.
///
/// All three calls are idempotent reads; implementations own retry/backoff.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn fetch_latest_height(&self) -> RpcResult<u64>;

    /// Events of the given types in `[start_block, end_block]` (inclusive).
    /// Order across types is not significant; the processor restores it from
    /// embedded sequence numbers.
    async fn fetch_events(
        &self,
        event_types: &[String],
        start_block: u64,
        end_block: u64,
    ) -> RpcResult<Vec<RawEvent>>;

    /// Call a Move view function, returning the raw `result` payload
    async fn call_view(
        &self,
        function: &str,
        type_arguments: Vec<String>,
        arguments: Vec<Value>,
    ) -> RpcResult<Value>;
}
