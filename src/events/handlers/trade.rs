use crate::database::events::insert_trade_if_absent;
use crate::database::models::TradeRecord;
use crate::database::tokens::ensure_user;
use crate::events::types::{ChainEvent, TradePayload, PLACEHOLDER_SEQUENCE};
use anyhow::Result;
use rusqlite::Connection;

/// Ingest a bonding-curve trade. Duplicate composite keys skip cleanly.
pub fn handle_trade(conn: &Connection, event: &ChainEvent, payload: &TradePayload) -> Result<bool> {
    ensure_user(conn, &event.network, &payload.user)?;

    let trade = TradeRecord {
        network: event.network.clone(),
        event_type: event.event_type.clone(),
        creation_number: event.creation_number.clone(),
        account_address: event.account_address.clone(),
        sequence_number: event.sequence_number.unwrap_or(PLACEHOLDER_SEQUENCE),
        timestamp: event.timestamp,
        is_buy: payload.is_buy,
        supra_amount: payload.supra_amount.clone(),
        token_address: payload.token_address.clone(),
        token_amount: payload.token_amount.clone(),
        user: payload.user.clone(),
        virtual_supra_reserves: payload.virtual_supra_reserves.clone(),
        virtual_token_reserves: payload.virtual_token_reserves.clone(),
    };

    insert_trade_if_absent(conn, &trade)
}
