//! SQLite persistence layer
//!
//! One connection behind a mutex; the composite UNIQUE constraints in the
//! schema are load-bearing for idempotent ingestion and must stay in sync
//! with the key derivation in `events::types`.

pub mod candles;
pub mod checkpoints;
pub mod events;
pub mod models;
pub mod pools;
pub mod tokens;

use anyhow::{anyhow, Result};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;
        Ok(db)
    }

    /// Run a closure with a plain connection borrow
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("Database lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Run a closure inside a transaction; commit on Ok, roll back on Err
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&mut Transaction) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("Database lock poisoned: {}", e))?;
        let mut tx = conn.transaction()?;
        let out = f(&mut tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("Database lock poisoned: {}", e))?;

        conn.execute_batch(
            r#"
            -- Per-network last fully processed block height
            CREATE TABLE IF NOT EXISTS checkpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                last_block_height INTEGER NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(network)
            );

            -- Idempotency ledger: one row per chain event ever seen
            CREATE TABLE IF NOT EXISTS event_tracking (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                transaction_hash TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                block_height INTEGER NOT NULL DEFAULT 0,
                processed INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(network, transaction_hash, sequence_number, event_type)
            );
            CREATE INDEX IF NOT EXISTS idx_tracking_unprocessed
                ON event_tracking(network, processed);

            CREATE TABLE IF NOT EXISTS tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                address TEXT NOT NULL,
                name TEXT,
                symbol TEXT,
                decimals INTEGER,
                icon_uri TEXT,
                project_uri TEXT,
                metadata_standard TEXT NOT NULL DEFAULT 'FungibleAsset',
                original_coin_type TEXT,
                metadata_fetched INTEGER NOT NULL DEFAULT 0,
                last_metadata_attempt INTEGER NOT NULL DEFAULT 0,
                UNIQUE(network, address)
            );

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                wallet_address TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(network, wallet_address)
            );

            CREATE TABLE IF NOT EXISTS trade_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                event_type TEXT NOT NULL,
                creation_number TEXT NOT NULL,
                account_address TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                is_buy INTEGER NOT NULL,
                supra_amount TEXT NOT NULL,
                token_address TEXT NOT NULL,
                token_amount TEXT NOT NULL,
                user TEXT NOT NULL,
                virtual_supra_reserves TEXT NOT NULL,
                virtual_token_reserves TEXT NOT NULL,
                processed_for_ohlc INTEGER NOT NULL DEFAULT 0,
                UNIQUE(network, creation_number, sequence_number, event_type)
            );
            CREATE INDEX IF NOT EXISTS idx_trades_unprocessed
                ON trade_events(network, processed_for_ohlc, timestamp);

            CREATE TABLE IF NOT EXISTS pools (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                token_address TEXT NOT NULL,
                name TEXT NOT NULL,
                symbol TEXT NOT NULL,
                description TEXT,
                token_decimals INTEGER NOT NULL,
                pool TEXT NOT NULL,
                dev TEXT NOT NULL,
                platform_fee INTEGER NOT NULL DEFAULT 0,
                initial_virtual_supra_reserves TEXT NOT NULL,
                initial_virtual_token_reserves TEXT NOT NULL,
                telegram TEXT,
                twitter TEXT,
                website TEXT,
                uri TEXT,
                UNIQUE(network, token_address)
            );

            CREATE TABLE IF NOT EXISTS amm_pairs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                pair_address TEXT NOT NULL,
                creator TEXT NOT NULL,
                token0_address TEXT NOT NULL,
                token1_address TEXT NOT NULL,
                reserve0 TEXT,
                reserve1 TEXT,
                tvl_usd TEXT,
                apr_24h TEXT,
                lp_fee_bps INTEGER,
                last_stats_update INTEGER,
                UNIQUE(network, pair_address)
            );

            CREATE TABLE IF NOT EXISTS migration_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                transaction_hash TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                token_address TEXT NOT NULL,
                migrator_address TEXT NOT NULL,
                supra_amount_added_to_lp TEXT NOT NULL,
                token_amount_added_to_lp TEXT NOT NULL,
                token_amount_burned TEXT NOT NULL,
                virtual_supra_reserves_at_migration TEXT NOT NULL,
                virtual_token_reserves_at_migration TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                UNIQUE(network, transaction_hash, sequence_number)
            );

            CREATE TABLE IF NOT EXISTS game_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                transaction_hash TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                game_id TEXT NOT NULL,
                player TEXT NOT NULL,
                token_address TEXT NOT NULL,
                wager_amount TEXT NOT NULL,
                payout_amount TEXT NOT NULL,
                won INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                UNIQUE(network, transaction_hash, sequence_number)
            );

            CREATE TABLE IF NOT EXISTS staking_pools (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                creator_address TEXT NOT NULL,
                stake_token_address TEXT NOT NULL,
                reward_token_address TEXT NOT NULL,
                is_dynamic_pool INTEGER NOT NULL DEFAULT 0,
                start_timestamp INTEGER NOT NULL DEFAULT 0,
                end_timestamp INTEGER NOT NULL DEFAULT 0,
                reward_per_sec TEXT NOT NULL DEFAULT '0',
                accum_reward TEXT NOT NULL DEFAULT '0',
                total_staked_amount TEXT NOT NULL DEFAULT '0',
                boost_enabled INTEGER NOT NULL DEFAULT 0,
                boost_config TEXT,
                reward_scale_factor TEXT NOT NULL,
                cached_tvl_usd TEXT,
                cached_apy TEXT,
                verified INTEGER NOT NULL DEFAULT 0,
                emergency_locked INTEGER NOT NULL DEFAULT 0,
                stakes_closed INTEGER NOT NULL DEFAULT 0,
                UNIQUE(network, creator_address, stake_token_address, reward_token_address)
            );

            -- OHLC candles; decimal values stored as TEXT for exactness
            CREATE TABLE IF NOT EXISTS price_candles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                token_address TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                granularity TEXT NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                UNIQUE(network, token_address, timestamp, granularity)
            );
            CREATE INDEX IF NOT EXISTS idx_candles_lookup
                ON price_candles(network, token_address, granularity, timestamp DESC);

            CREATE TABLE IF NOT EXISTS protocol_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                total_tvl_usd TEXT NOT NULL,
                amm_tvl_usd TEXT NOT NULL,
                staking_tvl_usd TEXT NOT NULL,
                UNIQUE(network, timestamp)
            );

            -- USD price feed rows, written by the external price updater
            CREATE TABLE IF NOT EXISTS token_prices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                token_address TEXT NOT NULL,
                price_usd TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT 0,
                UNIQUE(network, token_address)
            );

            -- AMM swaps, written by the external swap ingestion; the TVL job
            -- reads the trailing 24h for fee APR
            CREATE TABLE IF NOT EXISTS amm_swaps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network TEXT NOT NULL,
                pair_address TEXT NOT NULL,
                amount0_in TEXT NOT NULL DEFAULT '0',
                amount1_in TEXT NOT NULL DEFAULT '0',
                block_timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_swaps_recent
                ON amm_swaps(network, block_timestamp DESC);
            "#,
        )?;

        Ok(())
    }
}
