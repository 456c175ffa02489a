//! Spike Indexer - chain event ingestion and analytics for the Spike platform
//!
//! Polls a Supra-style RPC endpoint per network, turns raw chain events into
//! deduplicated domain records in SQLite, and keeps derived analytics (OHLC
//! candles, TVL, APR) fresh via periodic recomputation jobs.

pub mod aggregator;
pub mod arguments;
pub mod config;
pub mod database;
pub mod events;
pub mod indexer;
pub mod logger;
pub mod poller;
pub mod rpc;
pub mod scheduler;
pub mod tokens;
