//! Chain RPC access: rate-limited HTTP client and the `ChainRpc` seam

pub mod client;
pub mod types;

pub use client::{RpcClient, MAX_BLOCK_RANGE};
pub use types::{ChainRpc, EventGuid, RawEvent, RpcError, RpcResult};
