//! Token, user and price rows

use super::models::{MetadataStandard, Token};
use super::Database;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

fn token_from_row(row: &Row) -> rusqlite::Result<Token> {
    Ok(Token {
        network: row.get(0)?,
        address: row.get(1)?,
        name: row.get(2)?,
        symbol: row.get(3)?,
        decimals: row.get::<_, Option<i64>>(4)?.map(|d| d as u32),
        icon_uri: row.get(5)?,
        project_uri: row.get(6)?,
        metadata_standard: MetadataStandard::from_str(&row.get::<_, String>(7)?),
        original_coin_type: row.get(8)?,
        metadata_fetched: row.get::<_, i64>(9)? != 0,
        last_metadata_attempt: row.get(10)?,
    })
}

const TOKEN_COLUMNS: &str = "network, address, name, symbol, decimals, icon_uri, project_uri,
    metadata_standard, original_coin_type, metadata_fetched, last_metadata_attempt";

pub fn get_token(conn: &Connection, network: &str, address: &str) -> Result<Option<Token>> {
    let sql = format!(
        "SELECT {} FROM tokens WHERE network = ?1 AND address = ?2",
        TOKEN_COLUMNS
    );
    let token = conn
        .query_row(&sql, params![network, address], token_from_row)
        .optional()?;
    Ok(token)
}

/// Insert-if-absent; a concurrent create is benign and leaves the winner's row
pub fn insert_token_if_absent(conn: &Connection, token: &Token) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO tokens
            (network, address, name, symbol, decimals, icon_uri, project_uri,
             metadata_standard, original_coin_type, metadata_fetched, last_metadata_attempt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(network, address) DO NOTHING",
        params![
            token.network,
            token.address,
            token.name,
            token.symbol,
            token.decimals.map(|d| d as i64),
            token.icon_uri,
            token.project_uri,
            token.metadata_standard.as_str(),
            token.original_coin_type,
            token.metadata_fetched as i64,
            token.last_metadata_attempt
        ],
    )?;
    Ok(changed > 0)
}

/// Fill in metadata on a row that previously lacked it
pub fn update_token_metadata(conn: &Connection, token: &Token) -> Result<()> {
    conn.execute(
        "UPDATE tokens SET
            name = ?3, symbol = ?4, decimals = ?5, icon_uri = ?6, project_uri = ?7,
            metadata_standard = ?8, original_coin_type = ?9, metadata_fetched = ?10,
            last_metadata_attempt = ?11
         WHERE network = ?1 AND address = ?2",
        params![
            token.network,
            token.address,
            token.name,
            token.symbol,
            token.decimals.map(|d| d as i64),
            token.icon_uri,
            token.project_uri,
            token.metadata_standard.as_str(),
            token.original_coin_type,
            token.metadata_fetched as i64,
            token.last_metadata_attempt
        ],
    )?;
    Ok(())
}

pub fn touch_metadata_attempt(
    conn: &Connection,
    network: &str,
    address: &str,
    timestamp: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE tokens SET last_metadata_attempt = ?3
         WHERE network = ?1 AND address = ?2",
        params![network, address, timestamp],
    )?;
    Ok(())
}

/// Minimal identity row, created lazily; enriched elsewhere
pub fn ensure_user(conn: &Connection, network: &str, wallet_address: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO users (network, wallet_address) VALUES (?1, ?2)
         ON CONFLICT(network, wallet_address) DO NOTHING",
        params![network, wallet_address],
    )?;
    Ok(())
}

/// token address -> USD price for a network
pub fn load_prices_map(conn: &Connection, network: &str) -> Result<HashMap<String, Decimal>> {
    let mut stmt =
        conn.prepare("SELECT token_address, price_usd FROM token_prices WHERE network = ?1")?;
    let rows = stmt.query_map(params![network], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut map = HashMap::new();
    for row in rows {
        let (address, price) = row?;
        if let Ok(price) = Decimal::from_str(&price) {
            map.insert(address, price);
        }
    }
    Ok(map)
}

/// token address -> decimals, from token rows plus bonding-curve pool rows
pub fn load_decimals_map(conn: &Connection, network: &str) -> Result<HashMap<String, u32>> {
    let mut map = HashMap::new();

    let mut stmt = conn
        .prepare("SELECT address, decimals FROM tokens WHERE network = ?1 AND decimals IS NOT NULL")?;
    let rows = stmt.query_map(params![network], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (address, decimals) = row?;
        map.insert(address, decimals as u32);
    }

    let mut stmt =
        conn.prepare("SELECT token_address, token_decimals FROM pools WHERE network = ?1")?;
    let rows = stmt.query_map(params![network], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (address, decimals) = row?;
        map.entry(address).or_insert(decimals as u32);
    }

    Ok(map)
}

impl Database {
    pub fn get_token_row(&self, network: &str, address: &str) -> Result<Option<Token>> {
        self.with_connection(|conn| get_token(conn, network, address))
    }

    /// Upsert a USD price row; used by the external price feed and tests
    pub fn upsert_token_price(
        &self,
        network: &str,
        token_address: &str,
        price_usd: &str,
        updated_at: i64,
    ) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO token_prices (network, token_address, price_usd, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(network, token_address) DO UPDATE SET
                    price_usd = excluded.price_usd,
                    updated_at = excluded.updated_at",
                params![network, token_address, price_usd, updated_at],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn minimal_token(network: &str, address: &str) -> Token {
        Token {
            network: network.to_string(),
            address: address.to_string(),
            name: None,
            symbol: None,
            decimals: None,
            icon_uri: None,
            project_uri: None,
            metadata_standard: MetadataStandard::FungibleAsset,
            original_coin_type: None,
            metadata_fetched: false,
            last_metadata_attempt: 0,
        }
    }

    #[test]
    fn test_insert_if_absent_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            assert!(insert_token_if_absent(conn, &minimal_token("testnet", "0xabc")).unwrap());
            assert!(!insert_token_if_absent(conn, &minimal_token("testnet", "0xabc")).unwrap());
            // Different network gets its own row
            assert!(insert_token_if_absent(conn, &minimal_token("mainnet", "0xabc")).unwrap());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_metadata_update_flips_fetched() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            insert_token_if_absent(conn, &minimal_token("testnet", "0xabc")).unwrap();

            let mut updated = minimal_token("testnet", "0xabc");
            updated.name = Some("Spike".to_string());
            updated.symbol = Some("SPK".to_string());
            updated.decimals = Some(8);
            updated.metadata_fetched = true;
            updated.last_metadata_attempt = 1000;
            update_token_metadata(conn, &updated).unwrap();

            let row = get_token(conn, "testnet", "0xabc").unwrap().unwrap();
            assert!(row.metadata_fetched);
            assert_eq!(row.symbol.as_deref(), Some("SPK"));
            assert_eq!(row.decimals, Some(8));
            Ok(())
        })
        .unwrap();
    }
}
