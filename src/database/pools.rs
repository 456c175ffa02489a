//! Bonding-curve pools, AMM pairs, staking pools and swap rows

use super::models::{AmmPairRecord, AmmSwapRecord, PoolRecord, StakingPoolRecord};
use super::Database;
use anyhow::Result;
use rusqlite::{params, Connection, Row};

pub fn insert_pool_if_absent(conn: &Connection, pool: &PoolRecord) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO pools
            (network, token_address, name, symbol, description, token_decimals, pool, dev,
             platform_fee, initial_virtual_supra_reserves, initial_virtual_token_reserves,
             telegram, twitter, website, uri)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(network, token_address) DO NOTHING",
        params![
            pool.network,
            pool.token_address,
            pool.name,
            pool.symbol,
            pool.description,
            pool.token_decimals as i64,
            pool.pool,
            pool.dev,
            pool.platform_fee,
            pool.initial_virtual_supra_reserves,
            pool.initial_virtual_token_reserves,
            pool.telegram,
            pool.twitter,
            pool.website,
            pool.uri
        ],
    )?;
    Ok(changed > 0)
}

/// Pair creation writes reserves once; afterwards only the TVL job updates them
pub fn insert_amm_pair_if_absent(conn: &Connection, pair: &AmmPairRecord) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO amm_pairs
            (network, pair_address, creator, token0_address, token1_address,
             reserve0, reserve1, lp_fee_bps)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(network, pair_address) DO NOTHING",
        params![
            pair.network,
            pair.pair_address,
            pair.creator,
            pair.token0_address,
            pair.token1_address,
            pair.reserve0,
            pair.reserve1,
            pair.lp_fee_bps
        ],
    )?;
    Ok(changed > 0)
}

fn pair_from_row(row: &Row) -> rusqlite::Result<AmmPairRecord> {
    Ok(AmmPairRecord {
        network: row.get(0)?,
        pair_address: row.get(1)?,
        creator: row.get(2)?,
        token0_address: row.get(3)?,
        token1_address: row.get(4)?,
        reserve0: row.get(5)?,
        reserve1: row.get(6)?,
        tvl_usd: row.get(7)?,
        apr_24h: row.get(8)?,
        lp_fee_bps: row.get(9)?,
        last_stats_update: row.get(10)?,
    })
}

pub fn list_amm_pairs(conn: &Connection, network: &str) -> Result<Vec<AmmPairRecord>> {
    let mut stmt = conn.prepare(
        "SELECT network, pair_address, creator, token0_address, token1_address,
                reserve0, reserve1, tvl_usd, apr_24h, lp_fee_bps, last_stats_update
         FROM amm_pairs WHERE network = ?1",
    )?;
    let rows = stmt.query_map(params![network], pair_from_row)?;

    let mut pairs = Vec::new();
    for row in rows {
        pairs.push(row?);
    }
    Ok(pairs)
}

/// TVL/APR update from the aggregation job
pub fn update_pair_stats(
    conn: &Connection,
    network: &str,
    pair_address: &str,
    tvl_usd: &str,
    apr_24h: Option<&str>,
    updated_at: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE amm_pairs SET tvl_usd = ?3, apr_24h = ?4, last_stats_update = ?5
         WHERE network = ?1 AND pair_address = ?2",
        params![network, pair_address, tvl_usd, apr_24h, updated_at],
    )?;
    Ok(())
}

/// Staking pool registration; a collision on the composite key means the pool
/// is already registered and is not an error
pub fn insert_staking_pool_if_absent(conn: &Connection, pool: &StakingPoolRecord) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO staking_pools
            (network, creator_address, stake_token_address, reward_token_address,
             is_dynamic_pool, start_timestamp, end_timestamp, reward_per_sec, accum_reward,
             total_staked_amount, boost_enabled, boost_config, reward_scale_factor,
             verified, emergency_locked, stakes_closed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT(network, creator_address, stake_token_address, reward_token_address)
         DO NOTHING",
        params![
            pool.network,
            pool.creator_address,
            pool.stake_token_address,
            pool.reward_token_address,
            pool.is_dynamic_pool as i64,
            pool.start_timestamp,
            pool.end_timestamp,
            pool.reward_per_sec,
            pool.accum_reward,
            pool.total_staked_amount,
            pool.boost_enabled as i64,
            pool.boost_config,
            pool.reward_scale_factor,
            pool.verified as i64,
            pool.emergency_locked as i64,
            pool.stakes_closed as i64
        ],
    )?;
    Ok(changed > 0)
}

fn staking_pool_from_row(row: &Row) -> rusqlite::Result<StakingPoolRecord> {
    Ok(StakingPoolRecord {
        network: row.get(0)?,
        creator_address: row.get(1)?,
        stake_token_address: row.get(2)?,
        reward_token_address: row.get(3)?,
        is_dynamic_pool: row.get::<_, i64>(4)? != 0,
        start_timestamp: row.get(5)?,
        end_timestamp: row.get(6)?,
        reward_per_sec: row.get(7)?,
        accum_reward: row.get(8)?,
        total_staked_amount: row.get(9)?,
        boost_enabled: row.get::<_, i64>(10)? != 0,
        boost_config: row.get(11)?,
        reward_scale_factor: row.get(12)?,
        cached_tvl_usd: row.get(13)?,
        cached_apy: row.get(14)?,
        verified: row.get::<_, i64>(15)? != 0,
        emergency_locked: row.get::<_, i64>(16)? != 0,
        stakes_closed: row.get::<_, i64>(17)? != 0,
    })
}

pub fn list_staking_pools(conn: &Connection, network: &str) -> Result<Vec<StakingPoolRecord>> {
    let mut stmt = conn.prepare(
        "SELECT network, creator_address, stake_token_address, reward_token_address,
                is_dynamic_pool, start_timestamp, end_timestamp, reward_per_sec, accum_reward,
                total_staked_amount, boost_enabled, boost_config, reward_scale_factor,
                cached_tvl_usd, cached_apy, verified, emergency_locked, stakes_closed
         FROM staking_pools WHERE network = ?1",
    )?;
    let rows = stmt.query_map(params![network], staking_pool_from_row)?;

    let mut pools = Vec::new();
    for row in rows {
        pools.push(row?);
    }
    Ok(pools)
}

/// Valuation update from the aggregation job; cached_apy may be NULL when
/// a required price or decimals value is unknown
pub fn update_staking_valuation(
    conn: &Connection,
    pool: &StakingPoolRecord,
    cached_tvl_usd: &str,
    cached_apy: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE staking_pools SET cached_tvl_usd = ?5, cached_apy = ?6
         WHERE network = ?1 AND creator_address = ?2
           AND stake_token_address = ?3 AND reward_token_address = ?4",
        params![
            pool.network,
            pool.creator_address,
            pool.stake_token_address,
            pool.reward_token_address,
            cached_tvl_usd,
            cached_apy
        ],
    )?;
    Ok(())
}

/// Swaps newer than `since` for the 24h fee window
pub fn list_recent_swaps(
    conn: &Connection,
    network: &str,
    since: i64,
) -> Result<Vec<AmmSwapRecord>> {
    let mut stmt = conn.prepare(
        "SELECT network, pair_address, amount0_in, amount1_in, block_timestamp
         FROM amm_swaps WHERE network = ?1 AND block_timestamp >= ?2",
    )?;
    let rows = stmt.query_map(params![network, since], |row| {
        Ok(AmmSwapRecord {
            network: row.get(0)?,
            pair_address: row.get(1)?,
            amount0_in: row.get(2)?,
            amount1_in: row.get(3)?,
            block_timestamp: row.get(4)?,
        })
    })?;

    let mut swaps = Vec::new();
    for row in rows {
        swaps.push(row?);
    }
    Ok(swaps)
}

impl Database {
    pub fn list_amm_pair_rows(&self, network: &str) -> Result<Vec<AmmPairRecord>> {
        self.with_connection(|conn| list_amm_pairs(conn, network))
    }

    pub fn list_staking_pool_rows(&self, network: &str) -> Result<Vec<StakingPoolRecord>> {
        self.with_connection(|conn| list_staking_pools(conn, network))
    }

    /// Insert a swap row; belongs to the external swap ingestion, exposed for tests
    pub fn insert_amm_swap(&self, swap: &AmmSwapRecord) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO amm_swaps
                    (network, pair_address, amount0_in, amount1_in, block_timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    swap.network,
                    swap.pair_address,
                    swap.amount0_in,
                    swap.amount1_in,
                    swap.block_timestamp
                ],
            )?;
            Ok(())
        })
    }
}
