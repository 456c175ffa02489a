//! Rate-limited HTTP client for the chain node
//!
//! Every call retries with exponential backoff up to a fixed ceiling; a 429
//! takes a longer, separately-counted backoff path. Event fan-out runs in
//! fixed-size groups with an inter-group delay sized from the configured
//! requests-per-second budget.

use super::types::{ChainRpc, EventGuid, RawEvent, RpcError, RpcResult};
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

const MAX_RETRIES: u32 = 3;
const RATE_LIMIT_RETRIES: u32 = 5;
const RETRY_BASE_MS: u64 = 1000;
const RATE_LIMIT_BASE_MS: u64 = 2000;
/// Maximum block span a single events request may cover
pub const MAX_BLOCK_RANGE: u64 = 10;
/// Event types fetched concurrently per group
const TYPE_GROUP_SIZE: usize = 6;

/// Which retry schedule a failed request falls onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryKind {
    /// Network error or non-429 bad status
    Transient,
    /// 429: longer base, counted on its own ceiling
    RateLimited,
}

fn backoff_delay(kind: RetryKind, attempt: u32) -> Duration {
    let base = match kind {
        RetryKind::Transient => RETRY_BASE_MS,
        RetryKind::RateLimited => RATE_LIMIT_BASE_MS,
    };
    Duration::from_millis(base * (1 << attempt))
}

pub struct RpcClient {
    http: reqwest::Client,
    base_url: String,
    inter_group_delay: Duration,
}

impl RpcClient {
    pub fn new(base_url: &str, max_requests_per_second: u32) -> Self {
        let rps = max_requests_per_second.max(1) as u64;
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            inter_group_delay: Duration::from_millis(TYPE_GROUP_SIZE as u64 * 1000 / rps),
        }
    }

    /// GET with retry/backoff; 429 backs off longer and is counted separately
    async fn get_json(&self, url: &str) -> RpcResult<Value> {
        let mut attempts = 0u32;
        let mut rate_limit_attempts = 0u32;

        loop {
            let response = match self.http.get(url).send().await {
                Ok(r) => r,
                Err(e) => {
                    attempts += 1;
                    if attempts >= MAX_RETRIES {
                        return Err(RpcError::RetriesExhausted(format!("{}: {}", url, e)));
                    }
                    sleep(backoff_delay(RetryKind::Transient, attempts)).await;
                    continue;
                }
            };

            match response.status() {
                StatusCode::TOO_MANY_REQUESTS => {
                    rate_limit_attempts += 1;
                    if rate_limit_attempts > RATE_LIMIT_RETRIES {
                        return Err(RpcError::RateLimited(rate_limit_attempts));
                    }
                    logger::debug(
                        LogTag::Rpc,
                        &format!("Rate limit hit on {}, backing off", url),
                    );
                    sleep(backoff_delay(RetryKind::RateLimited, rate_limit_attempts)).await;
                }
                status if status.is_success() => {
                    return Ok(response.json::<Value>().await?);
                }
                status => {
                    attempts += 1;
                    if attempts >= MAX_RETRIES {
                        return Err(RpcError::Status(status.as_u16(), url.to_string()));
                    }
                    sleep(backoff_delay(RetryKind::Transient, attempts)).await;
                }
            }
        }
    }

    async fn post_json(&self, url: &str, payload: &Value) -> RpcResult<Value> {
        let mut attempts = 0u32;
        let mut rate_limit_attempts = 0u32;

        loop {
            let response = match self.http.post(url).json(payload).send().await {
                Ok(r) => r,
                Err(e) => {
                    attempts += 1;
                    if attempts >= MAX_RETRIES {
                        return Err(RpcError::RetriesExhausted(format!("{}: {}", url, e)));
                    }
                    sleep(backoff_delay(RetryKind::Transient, attempts)).await;
                    continue;
                }
            };

            match response.status() {
                StatusCode::TOO_MANY_REQUESTS => {
                    rate_limit_attempts += 1;
                    if rate_limit_attempts > RATE_LIMIT_RETRIES {
                        return Err(RpcError::RateLimited(rate_limit_attempts));
                    }
                    sleep(backoff_delay(RetryKind::RateLimited, rate_limit_attempts)).await;
                }
                status if status.is_success() => {
                    return Ok(response.json::<Value>().await?);
                }
                status => {
                    attempts += 1;
                    if attempts >= MAX_RETRIES {
                        return Err(RpcError::Status(status.as_u16(), url.to_string()));
                    }
                    sleep(backoff_delay(RetryKind::Transient, attempts)).await;
                }
            }
        }
    }

    /// Fetch one event type over a block range
    async fn fetch_type(
        &self,
        event_type: &str,
        start_block: u64,
        end_block: u64,
    ) -> RpcResult<Vec<RawEvent>> {
        let url = format!(
            "{}/events/{}?start={}&end={}",
            self.base_url, event_type, start_block, end_block
        );
        let body = self.get_json(&url).await?;

        let items = match body.get("data").and_then(|d| d.as_array()) {
            Some(items) => items.clone(),
            None => return Ok(Vec::new()),
        };

        let mut events = Vec::with_capacity(items.len());
        for item in items {
            events.push(parse_raw_event(event_type, start_block, &item));
        }
        Ok(events)
    }
}

fn parse_raw_event(event_type: &str, fallback_height: u64, item: &Value) -> RawEvent {
    let guid = item
        .get("guid")
        .and_then(|g| serde_json::from_value::<EventGuid>(g.clone()).ok());

    let sequence_number = item
        .get("sequence_number")
        .and_then(value_as_i64);

    let transaction_hash = item
        .get("transaction_hash")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    let block_height = item
        .get("block_height")
        .and_then(value_as_i64)
        .map(|h| h as u64)
        .unwrap_or(fallback_height);

    let data = item.get("data").cloned().unwrap_or(Value::Null);

    // Missing event timestamps are preserved as -1, matching the chain's
    // convention for historical events without one
    let timestamp = data
        .get("timestamp")
        .and_then(value_as_i64)
        .or_else(|| item.get("timestamp").and_then(value_as_i64))
        .unwrap_or(-1);

    RawEvent {
        event_type: event_type.to_string(),
        guid,
        sequence_number,
        transaction_hash,
        block_height,
        timestamp,
        data,
    }
}

/// Chain numbers arrive either as JSON numbers or decimal strings
pub fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}

#[async_trait]
impl ChainRpc for RpcClient {
    async fn fetch_latest_height(&self) -> RpcResult<u64> {
        let url = format!("{}/block", self.base_url);
        let body = self.get_json(&url).await?;

        body.get("height")
            .and_then(value_as_i64)
            .map(|h| h as u64)
            .ok_or_else(|| RpcError::InvalidResponse("missing height in /block response".into()))
    }

    async fn fetch_events(
        &self,
        event_types: &[String],
        start_block: u64,
        end_block: u64,
    ) -> RpcResult<Vec<RawEvent>> {
        // Clamp the inclusive span to MAX_BLOCK_RANGE blocks; callers needing
        // more issue multiple calls
        let end_block = end_block.min(start_block + MAX_BLOCK_RANGE - 1);

        let mut events = Vec::new();
        let groups: Vec<&[String]> = event_types.chunks(TYPE_GROUP_SIZE).collect();
        let group_count = groups.len();

        for (i, group) in groups.into_iter().enumerate() {
            let fetches = group
                .iter()
                .map(|event_type| self.fetch_type(event_type, start_block, end_block));

            for result in join_all(fetches).await {
                events.extend(result?);
            }

            if i + 1 < group_count {
                sleep(self.inter_group_delay).await;
            }
        }

        Ok(events)
    }

    async fn call_view(
        &self,
        function: &str,
        type_arguments: Vec<String>,
        arguments: Vec<Value>,
    ) -> RpcResult<Value> {
        let url = format!("{}/view", self.base_url);
        let payload = json!({
            "function": function,
            "type_arguments": type_arguments,
            "arguments": arguments,
        });

        let body = self.post_json(&url, &payload).await?;
        Ok(body.get("result").cloned().unwrap_or(body))
    }
}
