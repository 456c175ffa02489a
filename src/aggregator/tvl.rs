//! TVL and APR aggregation
//!
//! Values AMM pairs from decimal-adjusted reserves and the USD price table,
//! derives trailing-24h fee APR from recorded swap volume, values staking
//! pools from staked amounts and annualized reward emissions, and snapshots
//! protocol-wide totals hourly. Everything an entity needs that is missing
//! (price, decimals) makes that entity keep its previous cached values; one
//! bad pool never fails the run.

use crate::database::models::{AmmPairRecord, ProtocolStats, StakingPoolRecord};
use crate::database::pools::{
    list_amm_pairs, list_recent_swaps, list_staking_pools, update_pair_stats,
    update_staking_valuation,
};
use crate::database::tokens::{load_decimals_map, load_prices_map};
use crate::database::{candles, Database};
use crate::logger::{self, LogTag};
use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

const SECONDS_IN_YEAR: i64 = 31_536_000;
const DAY_SECS: i64 = 86_400;
const HOUR_SECS: i64 = 3_600;
const BPS_DENOMINATOR: i64 = 10_000;

pub struct TvlCalculator {
    db: Database,
    network: String,
}

struct PriceBook {
    prices: HashMap<String, Decimal>,
    decimals: HashMap<String, u32>,
}

impl PriceBook {
    /// USD value of a raw integer amount, if price and decimals are known
    fn value_usd(&self, token_address: &str, raw_amount: &str) -> Option<Decimal> {
        let price = self.prices.get(token_address)?;
        let decimals = self.decimals.get(token_address)?;
        let mut amount = Decimal::from_str(raw_amount).ok()?;
        amount.set_scale(*decimals).ok()?;
        Some(amount * price)
    }
}

impl TvlCalculator {
    pub fn new(db: Database, network: String) -> Self {
        Self { db, network }
    }

    /// One aggregation pass in a single transaction
    pub fn run(&self) -> Result<()> {
        self.run_at(Utc::now().timestamp())
    }

    pub fn run_at(&self, now: i64) -> Result<()> {
        let network = self.network.clone();
        self.db.with_transaction(move |tx| {
            let book = PriceBook {
                prices: load_prices_map(tx, &network)?,
                decimals: load_decimals_map(tx, &network)?,
            };

            let pairs = list_amm_pairs(tx, &network)?;
            let volume_24h = swap_volume_by_pair(
                &book,
                &list_recent_swaps(tx, &network, now - DAY_SECS)?,
                &pairs,
            );

            let mut amm_tvl = Decimal::ZERO;
            for pair in &pairs {
                match pair_tvl(&book, pair) {
                    Some(tvl) => {
                        amm_tvl += tvl;
                        let apr = pair_fee_apr(pair, tvl, volume_24h.get(&pair.pair_address));
                        update_pair_stats(
                            tx,
                            &network,
                            &pair.pair_address,
                            &format_usd(tvl),
                            apr.map(format_usd).as_deref(),
                            now,
                        )?;
                    }
                    None => {
                        logger::debug(
                            LogTag::Tvl,
                            &format!(
                                "[{}] Pair {} not priceable yet, keeping cached stats",
                                network, pair.pair_address
                            ),
                        );
                    }
                }
            }

            let mut staking_tvl = Decimal::ZERO;
            for pool in &list_staking_pools(tx, &network)? {
                match staking_valuation(&book, pool, now) {
                    Some((tvl, apr)) => {
                        staking_tvl += tvl;
                        update_staking_valuation(
                            tx,
                            pool,
                            &format_usd(tvl),
                            apr.map(format_usd).as_deref(),
                        )?;
                    }
                    None => {
                        logger::debug(
                            LogTag::Tvl,
                            &format!(
                                "[{}] Staking pool by {} not priceable yet, keeping cached values",
                                network, pool.creator_address
                            ),
                        );
                    }
                }
            }

            let hour_bucket = now - now.rem_euclid(HOUR_SECS);
            candles::upsert_protocol_stats(
                tx,
                &ProtocolStats {
                    network: network.clone(),
                    timestamp: hour_bucket,
                    total_tvl_usd: format_usd(amm_tvl + staking_tvl),
                    amm_tvl_usd: format_usd(amm_tvl),
                    staking_tvl_usd: format_usd(staking_tvl),
                },
            )?;

            logger::debug(
                LogTag::Tvl,
                &format!(
                    "[{}] TVL pass: amm={} staking={}",
                    network,
                    format_usd(amm_tvl),
                    format_usd(staking_tvl)
                ),
            );
            Ok(())
        })
    }
}

/// Sum of both reserve sides in USD; `None` when either side can't be priced
fn pair_tvl(book: &PriceBook, pair: &AmmPairRecord) -> Option<Decimal> {
    let reserve0 = pair.reserve0.as_deref()?;
    let reserve1 = pair.reserve1.as_deref()?;
    let side0 = book.value_usd(&pair.token0_address, reserve0)?;
    let side1 = book.value_usd(&pair.token1_address, reserve1)?;
    Some(side0 + side1)
}

/// Trailing-24h fee APR: dailyFees / TVL * 365 * 100.
/// `None` when TVL is zero or the fee rate is unknown.
fn pair_fee_apr(pair: &AmmPairRecord, tvl: Decimal, volume_usd: Option<&Decimal>) -> Option<Decimal> {
    if tvl.is_zero() {
        return None;
    }
    let fee_bps = pair.lp_fee_bps?;
    let volume = volume_usd.copied().unwrap_or(Decimal::ZERO);
    let daily_fees = volume * Decimal::from(fee_bps) / Decimal::from(BPS_DENOMINATOR);
    Some(daily_fees / tvl * Decimal::from(365) * Decimal::from(100))
}

/// USD swap volume per pair over the window; unpriceable legs contribute zero
fn swap_volume_by_pair(
    book: &PriceBook,
    swaps: &[crate::database::models::AmmSwapRecord],
    pairs: &[AmmPairRecord],
) -> HashMap<String, Decimal> {
    let tokens_by_pair: HashMap<&str, (&str, &str)> = pairs
        .iter()
        .map(|p| {
            (
                p.pair_address.as_str(),
                (p.token0_address.as_str(), p.token1_address.as_str()),
            )
        })
        .collect();

    let mut volume: HashMap<String, Decimal> = HashMap::new();
    for swap in swaps {
        let Some((token0, token1)) = tokens_by_pair.get(swap.pair_address.as_str()) else {
            continue;
        };
        let mut swap_usd = Decimal::ZERO;
        if let Some(v) = book.value_usd(token0, &swap.amount0_in) {
            swap_usd += v;
        }
        if let Some(v) = book.value_usd(token1, &swap.amount1_in) {
            swap_usd += v;
        }
        *volume.entry(swap.pair_address.clone()).or_default() += swap_usd;
    }
    volume
}

/// Staking pool TVL and APR.
///
/// Returns `None` when the stake side can't be priced (previous cache kept).
/// TVL of zero yields APR zero rather than dividing; an unpriceable reward
/// side yields `(tvl, None)` so the APR column goes NULL while TVL updates.
fn staking_valuation(
    book: &PriceBook,
    pool: &StakingPoolRecord,
    now: i64,
) -> Option<(Decimal, Option<Decimal>)> {
    let tvl = book.value_usd(&pool.stake_token_address, &pool.total_staked_amount)?;

    if tvl.is_zero() {
        return Some((tvl, Some(Decimal::ZERO)));
    }

    // Emissions stopped: pool valued, but yields nothing
    if pool.end_timestamp != 0 && pool.end_timestamp < now {
        return Some((tvl, Some(Decimal::ZERO)));
    }

    let scale = match Decimal::from_str(&pool.reward_scale_factor) {
        Ok(s) if !s.is_zero() => s,
        _ => return Some((tvl, None)),
    };
    let annual_reward_usd = book
        .value_usd(&pool.reward_token_address, &pool.reward_per_sec)
        .map(|per_sec| per_sec / scale * Decimal::from(SECONDS_IN_YEAR));

    let apr = annual_reward_usd.map(|usd| usd / tvl * Decimal::from(100));
    Some((tvl, apr))
}

/// Two-decimal USD string ("0.00", "54.75")
fn format_usd(value: Decimal) -> String {
    let mut rounded = value.round_dp(2);
    rounded.rescale(2);
    rounded.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{AmmSwapRecord, MetadataStandard, Token};
    use crate::database::pools::{insert_amm_pair_if_absent, insert_staking_pool_if_absent};
    use crate::database::tokens::insert_token_if_absent;

    fn seed_token(db: &Database, address: &str, decimals: u32, price_usd: &str) {
        db.with_connection(|conn| {
            insert_token_if_absent(
                conn,
                &Token {
                    network: "testnet".to_string(),
                    address: address.to_string(),
                    name: None,
                    symbol: None,
                    decimals: Some(decimals),
                    icon_uri: None,
                    project_uri: None,
                    metadata_standard: MetadataStandard::FungibleAsset,
                    original_coin_type: None,
                    metadata_fetched: true,
                    last_metadata_attempt: 0,
                },
            )
            .map(|_| ())
        })
        .unwrap();
        db.upsert_token_price("testnet", address, price_usd, 0).unwrap();
    }

    fn pair(reserve0: &str, reserve1: &str, lp_fee_bps: Option<i64>) -> AmmPairRecord {
        AmmPairRecord {
            network: "testnet".to_string(),
            pair_address: "0xpair".to_string(),
            creator: "0xcreator".to_string(),
            token0_address: "0xtok0".to_string(),
            token1_address: "0xtok1".to_string(),
            reserve0: Some(reserve0.to_string()),
            reserve1: Some(reserve1.to_string()),
            tvl_usd: None,
            apr_24h: None,
            lp_fee_bps,
            last_stats_update: None,
        }
    }

    fn staking_pool(total_staked: &str, reward_per_sec: &str) -> StakingPoolRecord {
        StakingPoolRecord {
            network: "testnet".to_string(),
            creator_address: "0xcreator".to_string(),
            stake_token_address: "0xstake".to_string(),
            reward_token_address: "0xreward".to_string(),
            is_dynamic_pool: false,
            start_timestamp: 0,
            end_timestamp: 0,
            reward_per_sec: reward_per_sec.to_string(),
            accum_reward: "0".to_string(),
            total_staked_amount: total_staked.to_string(),
            boost_enabled: false,
            boost_config: None,
            reward_scale_factor: "1000000000000".to_string(),
            cached_tvl_usd: None,
            cached_apy: None,
            verified: false,
            emergency_locked: false,
            stakes_closed: false,
        }
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(Decimal::ZERO), "0.00");
        assert_eq!(format_usd(Decimal::from_str("54.75").unwrap()), "54.75");
        assert_eq!(format_usd(Decimal::from_str("63.072").unwrap()), "63.07");
    }

    #[test]
    fn test_pair_tvl_and_fee_apr() {
        let db = Database::open_in_memory().unwrap();
        seed_token(&db, "0xtok0", 6, "2");
        seed_token(&db, "0xtok1", 8, "1");

        // Reserves: 1.0 tok0 at $2 + 2.0 tok1 at $1 = $4.00 TVL
        db.with_connection(|conn| {
            insert_amm_pair_if_absent(conn, &pair("1000000", "200000000", Some(30))).map(|_| ())
        })
        .unwrap();

        // One swap in the window: 1.0 tok0 in = $2 volume
        let now = 1_700_000_000;
        db.insert_amm_swap(&AmmSwapRecord {
            network: "testnet".to_string(),
            pair_address: "0xpair".to_string(),
            amount0_in: "1000000".to_string(),
            amount1_in: "0".to_string(),
            block_timestamp: now - 100,
        })
        .unwrap();

        TvlCalculator::new(db.clone(), "testnet".to_string())
            .run_at(now)
            .unwrap();

        let pairs = db.list_amm_pair_rows("testnet").unwrap();
        assert_eq!(pairs[0].tvl_usd.as_deref(), Some("4.00"));
        // fees = $2 * 30bps = $0.006; APR = 0.006/4 * 365 * 100 = 54.75
        assert_eq!(pairs[0].apr_24h.as_deref(), Some("54.75"));
    }

    #[test]
    fn test_unpriceable_pair_keeps_cached_values() {
        let db = Database::open_in_memory().unwrap();
        // tok1 has no price row
        seed_token(&db, "0xtok0", 6, "2");
        db.with_connection(|conn| {
            insert_amm_pair_if_absent(conn, &pair("1000000", "200000000", Some(30))).map(|_| ())
        })
        .unwrap();

        TvlCalculator::new(db.clone(), "testnet".to_string())
            .run_at(1_700_000_000)
            .unwrap();

        let pairs = db.list_amm_pair_rows("testnet").unwrap();
        assert_eq!(pairs[0].tvl_usd, None);
        assert_eq!(pairs[0].last_stats_update, None);
    }

    #[test]
    fn test_staking_aprs_and_guards() {
        let db = Database::open_in_memory().unwrap();
        seed_token(&db, "0xstake", 6, "1");
        seed_token(&db, "0xreward", 6, "2");

        // 100 staked tokens at $1; reward 1 raw unit/sec after descaling
        // (reward_per_sec = 1e12 over the 1e12 scale factor)
        db.with_connection(|conn| {
            insert_staking_pool_if_absent(conn, &staking_pool("100000000", "1000000000000"))
                .map(|_| ())
        })
        .unwrap();

        let now = 1_700_000_000;
        TvlCalculator::new(db.clone(), "testnet".to_string())
            .run_at(now)
            .unwrap();

        let pools = db.list_staking_pool_rows("testnet").unwrap();
        assert_eq!(pools[0].cached_tvl_usd.as_deref(), Some("100.00"));
        // 0.000001 tokens/sec * 31,536,000s * $2 = $63.072/yr on $100 = 63.07%
        assert_eq!(pools[0].cached_apy.as_deref(), Some("63.07"));
    }

    #[test]
    fn test_staking_zero_tvl_yields_zero_apr() {
        let db = Database::open_in_memory().unwrap();
        seed_token(&db, "0xstake", 6, "1");
        seed_token(&db, "0xreward", 6, "2");
        db.with_connection(|conn| {
            insert_staking_pool_if_absent(conn, &staking_pool("0", "1000000000000")).map(|_| ())
        })
        .unwrap();

        TvlCalculator::new(db.clone(), "testnet".to_string())
            .run_at(1_700_000_000)
            .unwrap();

        let pools = db.list_staking_pool_rows("testnet").unwrap();
        assert_eq!(pools[0].cached_tvl_usd.as_deref(), Some("0.00"));
        assert_eq!(pools[0].cached_apy.as_deref(), Some("0.00"));
    }

    #[test]
    fn test_staking_missing_reward_price_nulls_apr() {
        let db = Database::open_in_memory().unwrap();
        seed_token(&db, "0xstake", 6, "1");
        // no 0xreward price
        db.with_connection(|conn| {
            insert_staking_pool_if_absent(conn, &staking_pool("100000000", "1000000000000"))
                .map(|_| ())
        })
        .unwrap();

        TvlCalculator::new(db.clone(), "testnet".to_string())
            .run_at(1_700_000_000)
            .unwrap();

        let pools = db.list_staking_pool_rows("testnet").unwrap();
        assert_eq!(pools[0].cached_tvl_usd.as_deref(), Some("100.00"));
        assert_eq!(pools[0].cached_apy, None);
    }

    #[test]
    fn test_protocol_stats_hour_bucket() {
        let db = Database::open_in_memory().unwrap();
        seed_token(&db, "0xtok0", 6, "2");
        seed_token(&db, "0xtok1", 8, "1");
        db.with_connection(|conn| {
            insert_amm_pair_if_absent(conn, &pair("1000000", "200000000", None)).map(|_| ())
        })
        .unwrap();

        let now = 1_700_003_123;
        TvlCalculator::new(db.clone(), "testnet".to_string())
            .run_at(now)
            .unwrap();

        let bucket = now - now % 3600;
        let stats = db.get_protocol_stats_row("testnet", bucket).unwrap().unwrap();
        assert_eq!(stats.amm_tvl_usd, "4.00");
        assert_eq!(stats.staking_tvl_usd, "0.00");
        assert_eq!(stats.total_tvl_usd, "4.00");

        // Second run in the same hour overwrites, not duplicates
        TvlCalculator::new(db.clone(), "testnet".to_string())
            .run_at(now + 60)
            .unwrap();
        assert!(db.get_protocol_stats_row("testnet", bucket).unwrap().is_some());
    }
}
