//! Idempotency ledger and ingestion-owned event tables
//!
//! Transaction-scoped operations take a `&Connection` so they compose inside
//! the batch transaction (rusqlite transactions and savepoints deref to one).

use super::models::{EventKey, GameResultRecord, MigrationRecord, TradeRecord, TrackedEvent};
use super::Database;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// True if this event key already reached processed=1
pub fn is_event_processed(conn: &Connection, key: &EventKey) -> Result<bool> {
    let processed: Option<i64> = conn
        .query_row(
            "SELECT processed FROM event_tracking
             WHERE network = ?1 AND transaction_hash = ?2
               AND sequence_number = ?3 AND event_type = ?4",
            params![
                key.network,
                key.transaction_hash,
                key.sequence_number,
                key.event_type
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(processed == Some(1))
}

/// Create the tracking row if absent; a prior error is cleared for retry
pub fn ensure_tracking(conn: &Connection, key: &EventKey, block_height: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO event_tracking
            (network, transaction_hash, sequence_number, event_type, block_height, processed, error)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL)
         ON CONFLICT(network, transaction_hash, sequence_number, event_type)
         DO UPDATE SET error = NULL",
        params![
            key.network,
            key.transaction_hash,
            key.sequence_number,
            key.event_type,
            block_height as i64
        ],
    )?;
    Ok(())
}

/// Flip the ledger row to processed=1 inside the ambient transaction
pub fn mark_processed(conn: &Connection, key: &EventKey) -> Result<()> {
    conn.execute(
        "UPDATE event_tracking SET processed = 1, error = NULL
         WHERE network = ?1 AND transaction_hash = ?2
           AND sequence_number = ?3 AND event_type = ?4",
        params![
            key.network,
            key.transaction_hash,
            key.sequence_number,
            key.event_type
        ],
    )?;
    Ok(())
}

/// Create the trade row unless the composite key already exists.
/// Explicit check-then-create (no upsert) so duplicates are a visible skip.
pub fn insert_trade_if_absent(conn: &Connection, trade: &TradeRecord) -> Result<bool> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM trade_events
             WHERE network = ?1 AND creation_number = ?2
               AND sequence_number = ?3 AND event_type = ?4",
            params![
                trade.network,
                trade.creation_number,
                trade.sequence_number,
                trade.event_type
            ],
            |row| row.get(0),
        )
        .optional()?;

    if exists.is_some() {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO trade_events
            (network, event_type, creation_number, account_address, sequence_number,
             timestamp, is_buy, supra_amount, token_address, token_amount, user,
             virtual_supra_reserves, virtual_token_reserves, processed_for_ohlc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0)",
        params![
            trade.network,
            trade.event_type,
            trade.creation_number,
            trade.account_address,
            trade.sequence_number,
            trade.timestamp,
            trade.is_buy as i64,
            trade.supra_amount,
            trade.token_address,
            trade.token_amount,
            trade.user,
            trade.virtual_supra_reserves,
            trade.virtual_token_reserves
        ],
    )?;
    Ok(true)
}

pub fn insert_migration_if_absent(conn: &Connection, m: &MigrationRecord) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO migration_events
            (network, transaction_hash, sequence_number, token_address, migrator_address,
             supra_amount_added_to_lp, token_amount_added_to_lp, token_amount_burned,
             virtual_supra_reserves_at_migration, virtual_token_reserves_at_migration, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(network, transaction_hash, sequence_number) DO NOTHING",
        params![
            m.network,
            m.transaction_hash,
            m.sequence_number,
            m.token_address,
            m.migrator_address,
            m.supra_amount_added_to_lp,
            m.token_amount_added_to_lp,
            m.token_amount_burned,
            m.virtual_supra_reserves_at_migration,
            m.virtual_token_reserves_at_migration,
            m.timestamp
        ],
    )?;
    Ok(changed > 0)
}

pub fn insert_game_result_if_absent(conn: &Connection, g: &GameResultRecord) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO game_results
            (network, transaction_hash, sequence_number, game_id, player, token_address,
             wager_amount, payout_amount, won, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(network, transaction_hash, sequence_number) DO NOTHING",
        params![
            g.network,
            g.transaction_hash,
            g.sequence_number,
            g.game_id,
            g.player,
            g.token_address,
            g.wager_amount,
            g.payout_amount,
            g.won as i64,
            g.timestamp
        ],
    )?;
    Ok(changed > 0)
}

/// Unprocessed trades for a network in timestamp order, for the OHLC builder
pub fn load_unprocessed_trades(conn: &Connection, network: &str) -> Result<Vec<(i64, TradeRecord)>> {
    let mut stmt = conn.prepare(
        "SELECT id, network, event_type, creation_number, account_address, sequence_number,
                timestamp, is_buy, supra_amount, token_address, token_amount, user,
                virtual_supra_reserves, virtual_token_reserves
         FROM trade_events
         WHERE network = ?1 AND processed_for_ohlc = 0
         ORDER BY timestamp ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![network], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            TradeRecord {
                network: row.get(1)?,
                event_type: row.get(2)?,
                creation_number: row.get(3)?,
                account_address: row.get(4)?,
                sequence_number: row.get(5)?,
                timestamp: row.get(6)?,
                is_buy: row.get::<_, i64>(7)? != 0,
                supra_amount: row.get(8)?,
                token_address: row.get(9)?,
                token_amount: row.get(10)?,
                user: row.get(11)?,
                virtual_supra_reserves: row.get(12)?,
                virtual_token_reserves: row.get(13)?,
            },
        ))
    })?;

    let mut trades = Vec::new();
    for row in rows {
        trades.push(row?);
    }
    Ok(trades)
}

pub fn mark_trades_processed(conn: &Connection, ids: &[i64]) -> Result<()> {
    for id in ids {
        conn.execute(
            "UPDATE trade_events SET processed_for_ohlc = 1 WHERE id = ?1",
            params![id],
        )?;
    }
    Ok(())
}

impl Database {
    /// Best-effort error recording, outside the aborted batch transaction.
    /// Creates the tracking row when the savepoint rollback removed it.
    pub fn record_event_error(
        &self,
        key: &EventKey,
        block_height: u64,
        message: &str,
    ) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO event_tracking
                    (network, transaction_hash, sequence_number, event_type,
                     block_height, processed, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
                 ON CONFLICT(network, transaction_hash, sequence_number, event_type)
                 DO UPDATE SET error = excluded.error",
                params![
                    key.network,
                    key.transaction_hash,
                    key.sequence_number,
                    key.event_type,
                    block_height as i64,
                    message
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_tracked_event(&self, key: &EventKey) -> Result<Option<TrackedEvent>> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT block_height, processed, error FROM event_tracking
                     WHERE network = ?1 AND transaction_hash = ?2
                       AND sequence_number = ?3 AND event_type = ?4",
                    params![
                        key.network,
                        key.transaction_hash,
                        key.sequence_number,
                        key.event_type
                    ],
                    |row| {
                        Ok(TrackedEvent {
                            key: key.clone(),
                            block_height: row.get::<_, i64>(0)? as u64,
                            processed: row.get::<_, i64>(1)? != 0,
                            error: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn count_rows(&self, table: &str, network: &str) -> Result<u64> {
        self.with_connection(|conn| {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE network = ?1", table);
            let count: i64 = conn.query_row(&sql, params![network], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}
