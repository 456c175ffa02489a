use crate::database::events::insert_migration_if_absent;
use crate::database::models::MigrationRecord;
use crate::database::tokens::ensure_user;
use crate::events::types::{ChainEvent, MigrationPayload};
use anyhow::Result;
use rusqlite::Connection;

/// Ingest a bonding-curve migration to the AMM (TransferEvent).
pub fn handle_migration(
    conn: &Connection,
    event: &ChainEvent,
    payload: &MigrationPayload,
) -> Result<bool> {
    ensure_user(conn, &event.network, &payload.user)?;

    let key = event.idempotency_key();
    let record = MigrationRecord {
        network: event.network.clone(),
        transaction_hash: key.transaction_hash,
        sequence_number: key.sequence_number,
        token_address: payload.token_address.clone(),
        migrator_address: payload.user.clone(),
        supra_amount_added_to_lp: payload.supra_amount.clone(),
        token_amount_added_to_lp: payload.token_amount.clone(),
        token_amount_burned: payload.burned_amount.clone(),
        virtual_supra_reserves_at_migration: payload.virtual_supra_reserves.clone(),
        virtual_token_reserves_at_migration: payload.virtual_token_reserves.clone(),
        timestamp: event.timestamp,
    };

    insert_migration_if_absent(conn, &record)
}
