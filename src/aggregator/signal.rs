//! Trade-activity signal between ingestion and the OHLC job
//!
//! The poller marks a network when it applies new trades; the OHLC job runs
//! only for marked networks and clears the mark after a successful pass.
//! The mark is an optimization hint, not a correctness gate: trades carry a
//! `processed_for_ohlc` flag in the database, so a lost mark only delays.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
pub struct ActivitySignal {
    marked: Mutex<HashSet<String>>,
}

impl ActivitySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, network: &str) {
        if let Ok(mut marked) = self.marked.lock() {
            marked.insert(network.to_string());
        }
    }

    pub fn is_marked(&self, network: &str) -> bool {
        self.marked
            .lock()
            .map(|marked| marked.contains(network))
            .unwrap_or(false)
    }

    pub fn clear(&self, network: &str) {
        if let Ok(mut marked) = self.marked.lock() {
            marked.remove(network);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_is_per_network() {
        let signal = ActivitySignal::new();
        assert!(!signal.is_marked("testnet"));

        signal.mark("testnet");
        assert!(signal.is_marked("testnet"));
        assert!(!signal.is_marked("mainnet"));

        signal.clear("testnet");
        assert!(!signal.is_marked("testnet"));
    }
}
