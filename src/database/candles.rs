//! Price candles and protocol stats snapshots

use super::models::{Candle, ProtocolStats};
use super::Database;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::str::FromStr;

pub fn get_candle(
    conn: &Connection,
    network: &str,
    token_address: &str,
    timestamp: i64,
    granularity: &str,
) -> Result<Option<Candle>> {
    let candle = conn
        .query_row(
            "SELECT open, high, low, close, volume FROM price_candles
             WHERE network = ?1 AND token_address = ?2 AND timestamp = ?3 AND granularity = ?4",
            params![network, token_address, timestamp, granularity],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    match candle {
        None => Ok(None),
        Some((open, high, low, close, volume)) => Ok(Some(Candle {
            network: network.to_string(),
            token_address: token_address.to_string(),
            timestamp,
            granularity: granularity.to_string(),
            open: Decimal::from_str(&open)?,
            high: Decimal::from_str(&high)?,
            low: Decimal::from_str(&low)?,
            close: Decimal::from_str(&close)?,
            volume: Decimal::from_str(&volume)?,
        })),
    }
}

/// Create-or-widen a candle bucket.
///
/// Open is set only on creation; an existing bucket keeps its open, high/low
/// only widen and close/volume take the latest computation. Values are TEXT
/// decimals so the widen comparison happens here, not in SQL.
pub fn upsert_candle(conn: &Connection, candle: &Candle) -> Result<()> {
    let existing = get_candle(
        conn,
        &candle.network,
        &candle.token_address,
        candle.timestamp,
        &candle.granularity,
    )?;

    match existing {
        None => {
            conn.execute(
                "INSERT INTO price_candles
                    (network, token_address, timestamp, granularity, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    candle.network,
                    candle.token_address,
                    candle.timestamp,
                    candle.granularity,
                    candle.open.to_string(),
                    candle.high.to_string(),
                    candle.low.to_string(),
                    candle.close.to_string(),
                    candle.volume.to_string()
                ],
            )?;
        }
        Some(current) => {
            let high = current.high.max(candle.high);
            let low = current.low.min(candle.low);
            conn.execute(
                "UPDATE price_candles SET high = ?5, low = ?6, close = ?7, volume = ?8
                 WHERE network = ?1 AND token_address = ?2 AND timestamp = ?3 AND granularity = ?4",
                params![
                    candle.network,
                    candle.token_address,
                    candle.timestamp,
                    candle.granularity,
                    high.to_string(),
                    low.to_string(),
                    candle.close.to_string(),
                    candle.volume.to_string()
                ],
            )?;
        }
    }

    Ok(())
}

/// One snapshot per (network, hour bucket) per aggregation run
pub fn upsert_protocol_stats(conn: &Connection, stats: &ProtocolStats) -> Result<()> {
    conn.execute(
        "INSERT INTO protocol_stats (network, timestamp, total_tvl_usd, amm_tvl_usd, staking_tvl_usd)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(network, timestamp) DO UPDATE SET
            total_tvl_usd = excluded.total_tvl_usd,
            amm_tvl_usd = excluded.amm_tvl_usd,
            staking_tvl_usd = excluded.staking_tvl_usd",
        params![
            stats.network,
            stats.timestamp,
            stats.total_tvl_usd,
            stats.amm_tvl_usd,
            stats.staking_tvl_usd
        ],
    )?;
    Ok(())
}

impl Database {
    pub fn get_candle_row(
        &self,
        network: &str,
        token_address: &str,
        timestamp: i64,
        granularity: &str,
    ) -> Result<Option<Candle>> {
        self.with_connection(|conn| get_candle(conn, network, token_address, timestamp, granularity))
    }

    pub fn get_protocol_stats_row(
        &self,
        network: &str,
        timestamp: i64,
    ) -> Result<Option<ProtocolStats>> {
        self.with_connection(|conn| {
            let stats = conn
                .query_row(
                    "SELECT total_tvl_usd, amm_tvl_usd, staking_tvl_usd FROM protocol_stats
                     WHERE network = ?1 AND timestamp = ?2",
                    params![network, timestamp],
                    |row| {
                        Ok(ProtocolStats {
                            network: network.to_string(),
                            timestamp,
                            total_tvl_usd: row.get(0)?,
                            amm_tvl_usd: row.get(1)?,
                            staking_tvl_usd: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn candle(ts: i64, open: &str, high: &str, low: &str, close: &str, volume: &str) -> Candle {
        Candle {
            network: "testnet".to_string(),
            token_address: "0xtok".to_string(),
            timestamp: ts,
            granularity: "1m".to_string(),
            open: Decimal::from_str(open).unwrap(),
            high: Decimal::from_str(high).unwrap(),
            low: Decimal::from_str(low).unwrap(),
            close: Decimal::from_str(close).unwrap(),
            volume: Decimal::from_str(volume).unwrap(),
        }
    }

    #[test]
    fn test_upsert_preserves_open_and_widens_extremes() {
        let db = Database::open_in_memory().unwrap();

        db.with_connection(|conn| {
            upsert_candle(conn, &candle(0, "1.0", "1.5", "0.9", "1.2", "100")).unwrap();
            // Second write in the same bucket: open must survive, high/low widen
            upsert_candle(conn, &candle(0, "2.0", "1.4", "0.5", "1.1", "250")).unwrap();
            Ok(())
        })
        .unwrap();

        let row = db.get_candle_row("testnet", "0xtok", 0, "1m").unwrap().unwrap();
        assert_eq!(row.open, Decimal::from_str("1.0").unwrap());
        assert_eq!(row.high, Decimal::from_str("1.5").unwrap());
        assert_eq!(row.low, Decimal::from_str("0.5").unwrap());
        assert_eq!(row.close, Decimal::from_str("1.1").unwrap());
        assert_eq!(row.volume, Decimal::from_str("250").unwrap());
    }
}
