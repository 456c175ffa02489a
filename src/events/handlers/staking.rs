use super::HandlerContext;
use crate::database::models::StakingPoolRecord;
use crate::database::pools::insert_staking_pool_if_absent;
use crate::database::tokens::ensure_user;
use crate::events::types::{ChainEvent, StakingRegisteredPayload};
use anyhow::{bail, Result};
use rusqlite::Connection;

/// All registered pools share the contract's fixed-point reward scale (1e12)
pub const CONTRACT_REWARD_SCALE: &str = "1000000000000";

/// Ingest a staking pool registration.
///
/// Missing addresses are a hard error so the event stays visible in the
/// ledger with its failure recorded, rather than creating an unpriceable row.
pub fn handle_staking_registered(
    conn: &Connection,
    ctx: &HandlerContext,
    event: &ChainEvent,
    payload: &StakingRegisteredPayload,
) -> Result<bool> {
    if payload.creator_address.is_empty()
        || payload.stake_token_address.is_empty()
        || payload.reward_token_address.is_empty()
    {
        bail!(
            "staking registration missing addresses (creator='{}', stake='{}', reward='{}')",
            payload.creator_address,
            payload.stake_token_address,
            payload.reward_token_address
        );
    }

    ensure_user(conn, &event.network, &payload.creator_address)?;
    ctx.materialize_token(conn, &event.network, &payload.stake_token_address)?;
    ctx.materialize_token(conn, &event.network, &payload.reward_token_address)?;

    let record = StakingPoolRecord {
        network: event.network.clone(),
        creator_address: payload.creator_address.clone(),
        stake_token_address: payload.stake_token_address.clone(),
        reward_token_address: payload.reward_token_address.clone(),
        is_dynamic_pool: payload.is_dynamic_pool,
        start_timestamp: parse_timestamp(payload.start_timestamp.as_deref()),
        end_timestamp: parse_timestamp(payload.end_timestamp.as_deref()),
        reward_per_sec: if payload.reward_per_sec.is_empty() {
            "0".to_string()
        } else {
            payload.reward_per_sec.clone()
        },
        accum_reward: "0".to_string(),
        total_staked_amount: "0".to_string(),
        boost_enabled: payload.is_boostable,
        boost_config: payload
            .boost_config
            .as_ref()
            .filter(|v| !v.is_null())
            .map(|v| v.to_string()),
        reward_scale_factor: CONTRACT_REWARD_SCALE.to_string(),
        cached_tvl_usd: None,
        cached_apy: None,
        verified: false,
        emergency_locked: false,
        stakes_closed: false,
    };

    insert_staking_pool_if_absent(conn, &record)
}

fn parse_timestamp(value: Option<&str>) -> i64 {
    value.and_then(|s| s.parse().ok()).unwrap_or(0)
}
