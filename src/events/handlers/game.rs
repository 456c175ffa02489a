use crate::database::events::insert_game_result_if_absent;
use crate::database::models::GameResultRecord;
use crate::database::tokens::ensure_user;
use crate::events::types::{ChainEvent, GameResultPayload};
use anyhow::Result;
use rusqlite::Connection;

pub fn handle_game_result(
    conn: &Connection,
    event: &ChainEvent,
    payload: &GameResultPayload,
) -> Result<bool> {
    ensure_user(conn, &event.network, &payload.player)?;

    let key = event.idempotency_key();
    let record = GameResultRecord {
        network: event.network.clone(),
        transaction_hash: key.transaction_hash,
        sequence_number: key.sequence_number,
        game_id: payload.game_id.clone(),
        player: payload.player.clone(),
        token_address: payload.token_address.clone(),
        wager_amount: payload.wager_amount.clone(),
        payout_amount: payload.payout_amount.clone(),
        won: payload.won,
        timestamp: event.timestamp,
    };

    insert_game_result_if_absent(conn, &record)
}
