use super::Database;
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

impl Database {
    /// Last fully processed block height for a network, if any
    pub fn get_checkpoint(&self, network: &str) -> Result<Option<u64>> {
        self.with_connection(|conn| {
            let height: Option<i64> = conn
                .query_row(
                    "SELECT last_block_height FROM checkpoints WHERE network = ?1",
                    params![network],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(height.map(|h| h as u64))
        })
    }

    /// Read the checkpoint, creating it at `default_height` on first run.
    /// Returns the effective checkpoint value.
    pub fn init_checkpoint(&self, network: &str, default_height: u64) -> Result<u64> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO checkpoints (network, last_block_height) VALUES (?1, ?2)
                 ON CONFLICT(network) DO NOTHING",
                params![network, default_height as i64],
            )?;
            let height: i64 = conn.query_row(
                "SELECT last_block_height FROM checkpoints WHERE network = ?1",
                params![network],
                |row| row.get(0),
            )?;
            Ok(height as u64)
        })
    }

    /// Persist a checkpoint value; monotonically non-decreasing by construction
    pub fn persist_checkpoint(&self, network: &str, height: u64) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO checkpoints (network, last_block_height, updated_at)
                 VALUES (?1, ?2, CURRENT_TIMESTAMP)
                 ON CONFLICT(network) DO UPDATE SET
                    last_block_height = MAX(last_block_height, excluded.last_block_height),
                    updated_at = CURRENT_TIMESTAMP",
                params![network, height as i64],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;

    #[test]
    fn test_checkpoint_init_and_monotonicity() {
        let db = Database::open_in_memory().unwrap();

        assert_eq!(db.get_checkpoint("testnet").unwrap(), None);

        // First run creates at the default
        assert_eq!(db.init_checkpoint("testnet", 99).unwrap(), 99);
        // Second init keeps the stored value
        assert_eq!(db.init_checkpoint("testnet", 50).unwrap(), 99);

        db.persist_checkpoint("testnet", 120).unwrap();
        assert_eq!(db.get_checkpoint("testnet").unwrap(), Some(120));

        // A lower height never regresses the checkpoint
        db.persist_checkpoint("testnet", 80).unwrap();
        assert_eq!(db.get_checkpoint("testnet").unwrap(), Some(120));

        // Networks don't share rows
        assert_eq!(db.get_checkpoint("mainnet").unwrap(), None);
    }
}
