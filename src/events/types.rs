//! Typed chain events
//!
//! Raw events classify into a closed payload union, so dispatch is an
//! exhaustive match and "unknown event type" is a deliberate arm rather than
//! a stringly-typed fall-through.

use crate::config::ModuleConfig;
use crate::database::models::EventKey;
use crate::rpc::RawEvent;
use serde::Deserialize;

/// Sequence number recorded when the chain didn't supply one
pub const PLACEHOLDER_SEQUENCE: i64 = -1;

#[derive(Debug, Clone, Deserialize)]
pub struct TradePayload {
    pub is_buy: bool,
    pub supra_amount: String,
    pub token_address: String,
    pub token_amount: String,
    pub user: String,
    pub virtual_supra_reserves: String,
    pub virtual_token_reserves: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolCreatedPayload {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub description: Option<String>,
    pub token_address: String,
    pub token_decimals: u32,
    pub pool: String,
    pub dev: String,
    #[serde(default)]
    pub platform_fee: String,
    pub initial_virtual_supra_reserves: String,
    pub initial_virtual_token_reserves: String,
    #[serde(default)]
    pub telegram: Option<String>,
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairCreatedPayload {
    pub pair: String,
    pub creator: String,
    pub token0: String,
    pub token1: String,
    #[serde(default)]
    pub reserve0: Option<String>,
    #[serde(default)]
    pub reserve1: Option<String>,
    #[serde(default)]
    pub lp_fee_bps: Option<String>,
}

/// Bonding-curve migration to the AMM (TransferEvent on chain)
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationPayload {
    pub token_address: String,
    pub user: String,
    pub supra_amount: String,
    pub token_amount: String,
    pub burned_amount: String,
    pub virtual_supra_reserves: String,
    pub virtual_token_reserves: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameResultPayload {
    pub game_id: String,
    pub player: String,
    pub token_address: String,
    pub wager_amount: String,
    pub payout_amount: String,
    pub won: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StakingRegisteredPayload {
    pub creator_address: String,
    pub stake_token_address: String,
    pub reward_token_address: String,
    #[serde(default)]
    pub is_dynamic_pool: bool,
    #[serde(default)]
    pub start_timestamp: Option<String>,
    #[serde(default)]
    pub end_timestamp: Option<String>,
    #[serde(default)]
    pub reward_per_sec: String,
    #[serde(default)]
    pub is_boostable: bool,
    #[serde(default)]
    pub boost_config: Option<serde_json::Value>,
}

/// Closed union of the event kinds this indexer understands
#[derive(Debug, Clone)]
pub enum EventPayload {
    Trade(TradePayload),
    PoolCreated(PoolCreatedPayload),
    PairCreated(PairCreatedPayload),
    Migration(MigrationPayload),
    GameResult(GameResultPayload),
    StakingRegistered(StakingRegisteredPayload),
    /// Fetched type we deliberately ignore (e.g. UnfreezeEvent)
    Unknown,
    /// Known type whose data failed to parse; surfaces as a handler error
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct ChainEvent {
    pub network: String,
    pub event_type: String,
    pub transaction_hash: Option<String>,
    pub sequence_number: Option<i64>,
    pub creation_number: String,
    pub account_address: String,
    pub block_height: u64,
    pub timestamp: i64,
    pub payload: EventPayload,
}

impl ChainEvent {
    /// Classify a raw event into a typed one for a network
    pub fn classify(raw: &RawEvent, network: &str, modules: &ModuleConfig) -> ChainEvent {
        let payload = classify_payload(raw, modules);
        let (creation_number, account_address) = match &raw.guid {
            Some(guid) => (guid.creation_number.clone(), guid.account_address.clone()),
            None => ("unknown".to_string(), "unknown".to_string()),
        };

        ChainEvent {
            network: network.to_string(),
            event_type: raw.event_type.clone(),
            transaction_hash: raw.transaction_hash.clone(),
            sequence_number: raw.sequence_number,
            creation_number,
            account_address,
            block_height: raw.block_height,
            timestamp: raw.timestamp,
            payload,
        }
    }

    pub fn idempotency_key(&self) -> EventKey {
        derive_event_key(
            &self.network,
            &self.event_type,
            self.transaction_hash.as_deref(),
            self.sequence_number,
            self.block_height,
        )
    }
}

fn classify_payload(raw: &RawEvent, modules: &ModuleConfig) -> EventPayload {
    fn parse<T: for<'de> Deserialize<'de>>(
        raw: &RawEvent,
        wrap: fn(T) -> EventPayload,
    ) -> EventPayload {
        match serde_json::from_value::<T>(raw.data.clone()) {
            Ok(payload) => wrap(payload),
            Err(e) => EventPayload::Malformed(format!("{}: {}", raw.event_type, e)),
        }
    }

    let t = raw.event_type.as_str();
    if t == modules.pump_event("TradeEvent") {
        parse(raw, EventPayload::Trade)
    } else if t == modules.pump_event("PumpEvent") {
        parse(raw, EventPayload::PoolCreated)
    } else if t == modules.pump_event("TransferEvent") {
        parse(raw, EventPayload::Migration)
    } else if t == modules.amm_event("PairCreatedEvent") {
        parse(raw, EventPayload::PairCreated)
    } else if t == modules.game_event("GameResultEvent") {
        parse(raw, EventPayload::GameResult)
    } else if t == modules.staking_event("PoolRegisteredEvent") {
        parse(raw, EventPayload::StakingRegistered)
    } else {
        EventPayload::Unknown
    }
}

/// Single place placeholder keys are derived for events missing a transaction
/// hash or sequence number. The placeholder is deterministic over
/// (type, block height) so the ledger's uniqueness constraint keeps working;
/// a collision between truly anonymous events merely causes a skip.
pub fn derive_event_key(
    network: &str,
    event_type: &str,
    transaction_hash: Option<&str>,
    sequence_number: Option<i64>,
    block_height: u64,
) -> EventKey {
    let transaction_hash = match transaction_hash {
        Some(hash) if !hash.is_empty() => hash.to_string(),
        _ => format!("no-tx:{}:{}", event_type, block_height),
    };

    EventKey {
        network: network.to_string(),
        transaction_hash,
        sequence_number: sequence_number.unwrap_or(PLACEHOLDER_SEQUENCE),
        event_type: event_type.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::rpc::{EventGuid, RawEvent};
    use serde_json::json;

    fn raw(event_type: &str, data: serde_json::Value) -> RawEvent {
        RawEvent {
            event_type: event_type.to_string(),
            guid: Some(EventGuid {
                creation_number: "3".to_string(),
                account_address: "0xacc".to_string(),
            }),
            sequence_number: Some(11),
            transaction_hash: Some("0xhash".to_string()),
            block_height: 105,
            timestamp: 1_700_000_000,
            data,
        }
    }

    #[test]
    fn test_derive_key_with_placeholders() {
        let key = derive_event_key("testnet", "0x1::pump::TradeEvent", None, None, 42);
        assert_eq!(key.transaction_hash, "no-tx:0x1::pump::TradeEvent:42");
        assert_eq!(key.sequence_number, PLACEHOLDER_SEQUENCE);

        // Deterministic: same inputs, same key
        let again = derive_event_key("testnet", "0x1::pump::TradeEvent", None, None, 42);
        assert_eq!(key, again);

        // Distinct block heights produce distinct keys
        let other = derive_event_key("testnet", "0x1::pump::TradeEvent", None, None, 43);
        assert_ne!(key, other);

        // Empty hash counts as missing
        let empty = derive_event_key("testnet", "0x1::pump::TradeEvent", Some(""), Some(5), 42);
        assert_eq!(empty.transaction_hash, "no-tx:0x1::pump::TradeEvent:42");
        assert_eq!(empty.sequence_number, 5);
    }

    #[test]
    fn test_classify_trade_and_unknown() {
        let config = Config::default();
        let modules = &config.networks[0].modules;

        let trade = raw(
            &modules.pump_event("TradeEvent"),
            json!({
                "is_buy": true,
                "supra_amount": "500000000",
                "token_address": "0xtok",
                "token_amount": "1000000",
                "user": "0xuser",
                "virtual_supra_reserves": "1",
                "virtual_token_reserves": "2"
            }),
        );
        let event = ChainEvent::classify(&trade, "testnet", modules);
        assert!(matches!(event.payload, EventPayload::Trade(_)));
        assert_eq!(event.creation_number, "3");

        let unfreeze = raw(&modules.pump_event("UnfreezeEvent"), json!({}));
        let event = ChainEvent::classify(&unfreeze, "testnet", modules);
        assert!(matches!(event.payload, EventPayload::Unknown));
    }

    #[test]
    fn test_classify_malformed_known_type() {
        let config = Config::default();
        let modules = &config.networks[0].modules;

        let bad = raw(&modules.pump_event("TradeEvent"), json!({ "is_buy": true }));
        let event = ChainEvent::classify(&bad, "testnet", modules);
        assert!(matches!(event.payload, EventPayload::Malformed(_)));
    }
}
