//! Per-event-kind handlers
//!
//! Handlers run inside the batch transaction (behind a per-event savepoint)
//! and are therefore synchronous: anything needing the network happens in the
//! processor's prefetch phase and arrives here through [`HandlerContext`].
//! Each returns whether it applied a new row; `false` means an idempotent
//! skip of an already-ingested event.

mod game;
mod migration;
mod pair;
mod pool;
mod staking;
mod trade;

pub use game::handle_game_result;
pub use migration::handle_migration;
pub use pair::handle_pair_created;
pub use pool::handle_pool_created;
pub use staking::handle_staking_registered;
pub use trade::handle_trade;

use crate::database::models::{MetadataStandard, Token};
use crate::tokens::TokenResolver;
use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashMap;

/// Prefetched state a handler may consult inside the transaction
pub struct HandlerContext<'a> {
    pub resolver: &'a TokenResolver,
    /// Tokens resolved during the prefetch phase, keyed by address
    pub resolved: &'a HashMap<String, Token>,
}

impl<'a> HandlerContext<'a> {
    /// Materialize a token row for an address referenced by an event.
    ///
    /// Addresses the prefetch didn't cover get a minimal unfetched row so
    /// foreign references never dangle.
    pub fn materialize_token(
        &self,
        conn: &Connection,
        network: &str,
        address: &str,
    ) -> Result<Token> {
        match self.resolved.get(address) {
            Some(token) => self.resolver.materialize(conn, token),
            None => {
                let minimal = Token {
                    network: network.to_string(),
                    address: address.to_string(),
                    name: None,
                    symbol: None,
                    decimals: None,
                    icon_uri: None,
                    project_uri: None,
                    metadata_standard: if address.contains("::") {
                        MetadataStandard::LegacyCoin
                    } else {
                        MetadataStandard::FungibleAsset
                    },
                    original_coin_type: None,
                    metadata_fetched: false,
                    last_metadata_attempt: Utc::now().timestamp(),
                };
                self.resolver.materialize(conn, &minimal)
            }
        }
    }
}
