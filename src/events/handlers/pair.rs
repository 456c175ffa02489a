use super::HandlerContext;
use crate::database::models::AmmPairRecord;
use crate::database::pools::insert_amm_pair_if_absent;
use crate::database::tokens::ensure_user;
use crate::events::types::{ChainEvent, PairCreatedPayload};
use anyhow::Result;
use rusqlite::Connection;

/// Ingest an AMM pair creation, materializing both sides of the pair so the
/// TVL job can price them later.
pub fn handle_pair_created(
    conn: &Connection,
    ctx: &HandlerContext,
    event: &ChainEvent,
    payload: &PairCreatedPayload,
) -> Result<bool> {
    ensure_user(conn, &event.network, &payload.creator)?;
    ctx.materialize_token(conn, &event.network, &payload.token0)?;
    ctx.materialize_token(conn, &event.network, &payload.token1)?;

    let pair = AmmPairRecord {
        network: event.network.clone(),
        pair_address: payload.pair.clone(),
        creator: payload.creator.clone(),
        token0_address: payload.token0.clone(),
        token1_address: payload.token1.clone(),
        reserve0: payload.reserve0.clone(),
        reserve1: payload.reserve1.clone(),
        tvl_usd: None,
        apr_24h: None,
        lp_fee_bps: payload.lp_fee_bps.as_deref().and_then(|s| s.parse().ok()),
        last_stats_update: None,
    };

    insert_amm_pair_if_absent(conn, &pair)
}
