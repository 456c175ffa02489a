//! On-demand token metadata resolution and standard classification
//!
//! Resolution is two-phase so no database transaction is ever held across a
//! network call: `resolve` does the view calls and returns the best-known
//! token, `materialize` applies it inside the ambient batch transaction.

use crate::config::ModuleConfig;
use crate::database::models::{MetadataStandard, Token};
use crate::database::{tokens as token_store, Database};
use crate::logger::{self, LogTag};
use crate::rpc::{client::value_as_i64, ChainRpc};
use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::Arc;

/// Legacy coin types with well-known metadata; no view call needed
const KNOWN_LEGACY_COINS: &[(&str, &str, &str, u32)] =
    &[("0x1::supra_coin::SupraCoin", "Supra Coin", "SUPRA", 8)];

pub struct TokenResolver {
    db: Database,
    rpc: Arc<dyn ChainRpc>,
    modules: ModuleConfig,
}

impl TokenResolver {
    pub fn new(db: Database, rpc: Arc<dyn ChainRpc>, modules: ModuleConfig) -> Self {
        Self { db, rpc, modules }
    }

    /// Resolve metadata for an address, returning the best-known token.
    ///
    /// Cache hit (row with metadata_fetched) short-circuits. RPC failures are
    /// non-fatal: the returned token is minimal with metadata_fetched=false so
    /// downstream references never block.
    pub async fn resolve(&self, network: &str, address: &str) -> Token {
        match self.db.get_token_row(network, address) {
            Ok(Some(token)) if token.metadata_fetched => return token,
            Ok(_) => {}
            Err(e) => {
                logger::warning(
                    LogTag::Tokens,
                    &format!("[{}] Token lookup failed for {}: {}", network, address, e),
                );
            }
        }

        let mut token = Token {
            network: network.to_string(),
            address: address.to_string(),
            name: None,
            symbol: None,
            decimals: None,
            icon_uri: None,
            project_uri: None,
            metadata_standard: MetadataStandard::FungibleAsset,
            original_coin_type: None,
            metadata_fetched: false,
            last_metadata_attempt: Utc::now().timestamp(),
        };

        if is_coin_type(address) {
            self.resolve_legacy_coin(&mut token).await;
        } else {
            self.resolve_fungible_asset(&mut token).await;
            self.classify_wrapped(&mut token).await;
        }

        token
    }

    /// Legacy Move coin: known hardcoded entries first, then the coin-info view
    async fn resolve_legacy_coin(&self, token: &mut Token) {
        token.metadata_standard = MetadataStandard::LegacyCoin;

        if let Some((_, name, symbol, decimals)) = KNOWN_LEGACY_COINS
            .iter()
            .find(|(coin_type, ..)| *coin_type == token.address)
        {
            token.name = Some((*name).to_string());
            token.symbol = Some((*symbol).to_string());
            token.decimals = Some(*decimals);
            token.metadata_fetched = true;
            return;
        }

        let result = self
            .rpc
            .call_view(
                "0x1::coin::coin_info",
                vec![token.address.clone()],
                Vec::new(),
            )
            .await;

        match result {
            Ok(value) => {
                if apply_metadata_values(token, &value) {
                    token.metadata_fetched = true;
                }
            }
            Err(e) => {
                logger::debug(
                    LogTag::Tokens,
                    &format!(
                        "[{}] coin_info view failed for {}: {}",
                        token.network, token.address, e
                    ),
                );
            }
        }
    }

    /// Fungible-asset metadata view call
    async fn resolve_fungible_asset(&self, token: &mut Token) {
        let result = self
            .rpc
            .call_view(
                &self.modules.fa_view("metadata"),
                Vec::new(),
                vec![json!(token.address)],
            )
            .await;

        match result {
            Ok(value) => {
                if apply_metadata_values(token, &value) {
                    token.metadata_fetched = true;
                } else {
                    logger::debug(
                        LogTag::Tokens,
                        &format!(
                            "[{}] Malformed metadata response for {}",
                            token.network, token.address
                        ),
                    );
                }
            }
            Err(e) => {
                logger::warning(
                    LogTag::Tokens,
                    &format!(
                        "[{}] Metadata fetch failed for {}: {}",
                        token.network, token.address, e
                    ),
                );
            }
        }
    }

    /// A wrapper FA reports its underlying coin type; classify accordingly
    async fn classify_wrapped(&self, token: &mut Token) {
        let result = self
            .rpc
            .call_view(
                &self.modules.fa_view("get_original_from_wrapped"),
                Vec::new(),
                vec![json!(token.address)],
            )
            .await;

        if let Ok(value) = result {
            if let Some(original) = first_string(&value) {
                if is_coin_type(&original) && original != "0x0" && original != token.address {
                    token.original_coin_type = Some(original);
                    token.metadata_standard = MetadataStandard::LegacyCoin;
                }
            }
        }
    }

    /// Apply a resolved token inside the ambient transaction.
    ///
    /// Creates the row if absent (concurrent creation is benign), upgrades a
    /// row that previously lacked metadata, and always stamps the attempt.
    pub fn materialize(&self, conn: &Connection, resolved: &Token) -> Result<Token> {
        let created = token_store::insert_token_if_absent(conn, resolved)?;
        if created {
            return Ok(resolved.clone());
        }

        // Row already existed: someone else created it, or a prior attempt
        // left it without metadata
        let existing = token_store::get_token(conn, &resolved.network, &resolved.address)?;
        match existing {
            Some(current) => {
                let upgrades_metadata = !current.metadata_fetched && resolved.metadata_fetched;
                let reclassifies = current.metadata_standard != resolved.metadata_standard
                    || current.original_coin_type != resolved.original_coin_type;

                if upgrades_metadata || (reclassifies && resolved.metadata_fetched) {
                    token_store::update_token_metadata(conn, resolved)?;
                    Ok(resolved.clone())
                } else {
                    token_store::touch_metadata_attempt(
                        conn,
                        &current.network,
                        &current.address,
                        resolved.last_metadata_attempt,
                    )?;
                    Ok(current)
                }
            }
            // Gone between insert and select; re-insert wins
            None => {
                token_store::insert_token_if_absent(conn, resolved)?;
                Ok(resolved.clone())
            }
        }
    }
}

/// Module-path separator marks a legacy coin type rather than an FA address
pub fn is_coin_type(address: &str) -> bool {
    address.contains("::")
}

/// First string in a view response, whether wrapped in a result array or bare
fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.first().and_then(|v| v.as_str()).map(|s| s.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Pull name/symbol/decimals out of a view response, tolerating both a bare
/// object and the result-array wrapping
fn apply_metadata_values(token: &mut Token, value: &Value) -> bool {
    let obj = match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let obj = match obj {
        Some(Value::Object(map)) => map,
        _ => return false,
    };

    let name = obj.get("name").and_then(|v| v.as_str());
    let symbol = obj.get("symbol").and_then(|v| v.as_str());
    let decimals = obj.get("decimals").and_then(value_as_i64);

    match (name, symbol, decimals) {
        (Some(name), Some(symbol), Some(decimals)) if decimals >= 0 => {
            token.name = Some(name.to_string());
            token.symbol = Some(symbol.to_string());
            token.decimals = Some(decimals as u32);
            token.icon_uri = obj
                .get("icon_uri")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            token.project_uri = obj
                .get("project_uri")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RawEvent, RpcError, RpcResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted view responses: each call pops the next outcome for its function
    struct StubRpc {
        responses: Mutex<Vec<(String, RpcResult<Value>)>>,
    }

    impl StubRpc {
        fn new(responses: Vec<(String, RpcResult<Value>)>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl ChainRpc for StubRpc {
        async fn fetch_latest_height(&self) -> RpcResult<u64> {
            Ok(0)
        }

        async fn fetch_events(
            &self,
            _event_types: &[String],
            _start_block: u64,
            _end_block: u64,
        ) -> RpcResult<Vec<RawEvent>> {
            Ok(Vec::new())
        }

        async fn call_view(
            &self,
            function: &str,
            _type_arguments: Vec<String>,
            _arguments: Vec<Value>,
        ) -> RpcResult<Value> {
            let mut responses = self.responses.lock().unwrap();
            if let Some(pos) = responses.iter().position(|(f, _)| function.ends_with(f)) {
                let (_, result) = responses.remove(pos);
                return result;
            }
            Err(RpcError::RetriesExhausted(format!("no stub for {}", function)))
        }
    }

    fn modules() -> ModuleConfig {
        crate::config::Config::default().networks[0].modules.clone()
    }

    fn metadata_response(name: &str, symbol: &str, decimals: u32) -> Value {
        json!([{ "name": name, "symbol": symbol, "decimals": decimals }])
    }

    #[tokio::test]
    async fn test_fail_then_succeed_updates_without_duplicate() {
        let db = Database::open_in_memory().unwrap();

        // First attempt: every view call fails
        let rpc = Arc::new(StubRpc::new(vec![]));
        let resolver = TokenResolver::new(db.clone(), rpc, modules());

        let first = resolver.resolve("testnet", "0xtok").await;
        assert!(!first.metadata_fetched);
        db.with_connection(|conn| resolver.materialize(conn, &first).map(|_| ()))
            .unwrap();

        // Second attempt: metadata resolves
        let rpc = Arc::new(StubRpc::new(vec![
            (
                "::metadata".to_string(),
                Ok(metadata_response("Spike", "SPK", 6)),
            ),
            ("::get_original_from_wrapped".to_string(), Ok(json!(["0x0"]))),
        ]));
        let resolver = TokenResolver::new(db.clone(), rpc, modules());

        let second = resolver.resolve("testnet", "0xtok").await;
        assert!(second.metadata_fetched);
        db.with_connection(|conn| resolver.materialize(conn, &second).map(|_| ()))
            .unwrap();

        let row = db.get_token_row("testnet", "0xtok").unwrap().unwrap();
        assert!(row.metadata_fetched);
        assert_eq!(row.name.as_deref(), Some("Spike"));
        assert_eq!(row.decimals, Some(6));
        assert_eq!(db.count_rows("tokens", "testnet").unwrap(), 1);

        // Third resolve is a cache hit: no stubbed calls remain, still fetched
        let rpc = Arc::new(StubRpc::new(vec![]));
        let resolver = TokenResolver::new(db.clone(), rpc, modules());
        let third = resolver.resolve("testnet", "0xtok").await;
        assert!(third.metadata_fetched);
        assert_eq!(third.symbol.as_deref(), Some("SPK"));
    }

    #[tokio::test]
    async fn test_wrapped_token_classifies_as_legacy_coin() {
        let db = Database::open_in_memory().unwrap();
        let rpc = Arc::new(StubRpc::new(vec![
            (
                "::metadata".to_string(),
                Ok(metadata_response("Wrapped Moon", "wMOON", 8)),
            ),
            (
                "::get_original_from_wrapped".to_string(),
                Ok(json!(["0xabc::moon::MOON"])),
            ),
        ]));
        let resolver = TokenResolver::new(db, rpc, modules());

        let token = resolver.resolve("testnet", "0xwrapped").await;
        assert_eq!(token.metadata_standard, MetadataStandard::LegacyCoin);
        assert_eq!(token.original_coin_type.as_deref(), Some("0xabc::moon::MOON"));
    }

    #[tokio::test]
    async fn test_known_legacy_coin_needs_no_rpc() {
        let db = Database::open_in_memory().unwrap();
        let rpc = Arc::new(StubRpc::new(vec![]));
        let resolver = TokenResolver::new(db, rpc, modules());

        let token = resolver.resolve("testnet", "0x1::supra_coin::SupraCoin").await;
        assert!(token.metadata_fetched);
        assert_eq!(token.symbol.as_deref(), Some("SUPRA"));
        assert_eq!(token.decimals, Some(8));
        assert_eq!(token.metadata_standard, MetadataStandard::LegacyCoin);
    }
}
