use super::HandlerContext;
use crate::database::models::{MetadataStandard, PoolRecord, Token};
use crate::database::pools::insert_pool_if_absent;
use crate::database::tokens::ensure_user;
use crate::events::types::{ChainEvent, PoolCreatedPayload};
use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

/// Ingest a bonding-curve pool creation (PumpEvent).
///
/// The event itself carries full token metadata, so the token row is created
/// directly rather than through a view call.
pub fn handle_pool_created(
    conn: &Connection,
    ctx: &HandlerContext,
    event: &ChainEvent,
    payload: &PoolCreatedPayload,
) -> Result<bool> {
    ensure_user(conn, &event.network, &payload.dev)?;

    let token = Token {
        network: event.network.clone(),
        address: payload.token_address.clone(),
        name: Some(payload.name.clone()),
        symbol: Some(payload.symbol.clone()),
        decimals: Some(payload.token_decimals),
        icon_uri: payload.uri.clone(),
        project_uri: payload.website.clone(),
        metadata_standard: MetadataStandard::FungibleAsset,
        original_coin_type: None,
        metadata_fetched: true,
        last_metadata_attempt: Utc::now().timestamp(),
    };
    ctx.resolver.materialize(conn, &token)?;

    let pool = PoolRecord {
        network: event.network.clone(),
        token_address: payload.token_address.clone(),
        name: payload.name.clone(),
        symbol: payload.symbol.clone(),
        description: payload.description.clone(),
        token_decimals: payload.token_decimals,
        pool: payload.pool.clone(),
        dev: payload.dev.clone(),
        platform_fee: payload.platform_fee.parse().unwrap_or(0),
        initial_virtual_supra_reserves: payload.initial_virtual_supra_reserves.clone(),
        initial_virtual_token_reserves: payload.initial_virtual_token_reserves.clone(),
        telegram: payload.telegram.clone(),
        twitter: payload.twitter.clone(),
        website: payload.website.clone(),
        uri: payload.uri.clone(),
    };

    insert_pool_if_absent(conn, &pool)
}
