use rust_decimal::Decimal;

/// Token standard classification resolved via view calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataStandard {
    FungibleAsset,
    LegacyCoin,
}

impl MetadataStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataStandard::FungibleAsset => "FungibleAsset",
            MetadataStandard::LegacyCoin => "LegacyCoin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "LegacyCoin" => MetadataStandard::LegacyCoin,
            _ => MetadataStandard::FungibleAsset,
        }
    }
}

/// Lazily created token row; never deleted, enriched when metadata resolves
#[derive(Debug, Clone)]
pub struct Token {
    pub network: String,
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u32>,
    pub icon_uri: Option<String>,
    pub project_uri: Option<String>,
    pub metadata_standard: MetadataStandard,
    pub original_coin_type: Option<String>,
    pub metadata_fetched: bool,
    pub last_metadata_attempt: i64,
}

/// Idempotency ledger key, unique per (network, tx hash, sequence, type)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub network: String,
    pub transaction_hash: String,
    pub sequence_number: i64,
    pub event_type: String,
}

#[derive(Debug, Clone)]
pub struct TrackedEvent {
    pub key: EventKey,
    pub block_height: u64,
    pub processed: bool,
    pub error: Option<String>,
}

/// Immutable trade record; only `processed_for_ohlc` mutates after creation
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub network: String,
    pub event_type: String,
    pub creation_number: String,
    pub account_address: String,
    pub sequence_number: i64,
    pub timestamp: i64,
    pub is_buy: bool,
    pub supra_amount: String,
    pub token_address: String,
    pub token_amount: String,
    pub user: String,
    pub virtual_supra_reserves: String,
    pub virtual_token_reserves: String,
}

/// Bonding-curve pool created by a PumpEvent
#[derive(Debug, Clone)]
pub struct PoolRecord {
    pub network: String,
    pub token_address: String,
    pub name: String,
    pub symbol: String,
    pub description: Option<String>,
    pub token_decimals: u32,
    pub pool: String,
    pub dev: String,
    pub platform_fee: i64,
    pub initial_virtual_supra_reserves: String,
    pub initial_virtual_token_reserves: String,
    pub telegram: Option<String>,
    pub twitter: Option<String>,
    pub website: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AmmPairRecord {
    pub network: String,
    pub pair_address: String,
    pub creator: String,
    pub token0_address: String,
    pub token1_address: String,
    pub reserve0: Option<String>,
    pub reserve1: Option<String>,
    pub tvl_usd: Option<String>,
    pub apr_24h: Option<String>,
    pub lp_fee_bps: Option<i64>,
    pub last_stats_update: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub network: String,
    pub transaction_hash: String,
    pub sequence_number: i64,
    pub token_address: String,
    pub migrator_address: String,
    pub supra_amount_added_to_lp: String,
    pub token_amount_added_to_lp: String,
    pub token_amount_burned: String,
    pub virtual_supra_reserves_at_migration: String,
    pub virtual_token_reserves_at_migration: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct GameResultRecord {
    pub network: String,
    pub transaction_hash: String,
    pub sequence_number: i64,
    pub game_id: String,
    pub player: String,
    pub token_address: String,
    pub wager_amount: String,
    pub payout_amount: String,
    pub won: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct StakingPoolRecord {
    pub network: String,
    pub creator_address: String,
    pub stake_token_address: String,
    pub reward_token_address: String,
    pub is_dynamic_pool: bool,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub reward_per_sec: String,
    pub accum_reward: String,
    pub total_staked_amount: String,
    pub boost_enabled: bool,
    pub boost_config: Option<String>,
    pub reward_scale_factor: String,
    pub cached_tvl_usd: Option<String>,
    pub cached_apy: Option<String>,
    pub verified: bool,
    pub emergency_locked: bool,
    pub stakes_closed: bool,
}

/// One OHLC bucket for a token; append-only per (token, bucket, granularity)
#[derive(Debug, Clone)]
pub struct Candle {
    pub network: String,
    pub token_address: String,
    pub timestamp: i64,
    pub granularity: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone)]
pub struct ProtocolStats {
    pub network: String,
    pub timestamp: i64,
    pub total_tvl_usd: String,
    pub amm_tvl_usd: String,
    pub staking_tvl_usd: String,
}

/// AMM swap rows written by the external swap ingestion; read-only here,
/// consumed by the 24h fee APR computation
#[derive(Debug, Clone)]
pub struct AmmSwapRecord {
    pub network: String,
    pub pair_address: String,
    pub amount0_in: String,
    pub amount1_in: String,
    pub block_timestamp: i64,
}
