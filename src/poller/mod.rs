//! Checkpointed block-range poller
//!
//! One poller per network walks the chain in fixed ranges behind the latest
//! height, feeding fetched events to the processor. Progress checkpoints
//! persist on an interval (and unconditionally on shutdown), so a crash
//! re-delivers at most one checkpoint interval of events; the processor's
//! idempotency ledger absorbs those.

use crate::database::Database;
use crate::events::EventProcessor;
use crate::logger::{self, LogTag};
use crate::rpc::{ChainRpc, MAX_BLOCK_RANGE};
use anyhow::Result;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Backoff after a fetch or processing failure before retrying the same range
const ERROR_BACKOFF_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PollerState {
    Uninitialized = 0,
    Initializing = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl PollerState {
    fn from_u8(v: u8) -> PollerState {
        match v {
            1 => PollerState::Initializing,
            2 => PollerState::Running,
            3 => PollerState::Stopping,
            4 => PollerState::Stopped,
            _ => PollerState::Uninitialized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PollerState::Uninitialized => "uninitialized",
            PollerState::Initializing => "initializing",
            PollerState::Running => "running",
            PollerState::Stopping => "stopping",
            PollerState::Stopped => "stopped",
        }
    }
}

/// Lock-free progress snapshot shared with the indexer manager
#[derive(Default)]
pub struct PollerStatus {
    state: AtomicU8,
    /// Next block height to fetch
    current_height: AtomicU64,
    /// Latest chain height seen
    latest_height: AtomicU64,
    batches_processed: AtomicU64,
    events_applied: AtomicU64,
    events_failed: AtomicU64,
}

impl PollerStatus {
    pub fn state(&self) -> PollerState {
        PollerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn current_height(&self) -> u64 {
        self.current_height.load(Ordering::Relaxed)
    }

    pub fn latest_height(&self) -> u64 {
        self.latest_height.load(Ordering::Relaxed)
    }

    pub fn batches_processed(&self) -> u64 {
        self.batches_processed.load(Ordering::Relaxed)
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied.load(Ordering::Relaxed)
    }

    pub fn events_failed(&self) -> u64 {
        self.events_failed.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: PollerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

pub struct EventPoller {
    db: Database,
    rpc: Arc<dyn ChainRpc>,
    processor: EventProcessor,
    network: String,
    event_types: Vec<String>,
    start_block_height: u64,
    batch_size: u64,
    poll_interval: Duration,
    checkpoint_interval: Duration,
    stop_flag: Arc<AtomicBool>,
    status: Arc<PollerStatus>,
}

impl EventPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        rpc: Arc<dyn ChainRpc>,
        processor: EventProcessor,
        network: String,
        event_types: Vec<String>,
        start_block_height: u64,
        batch_size: u64,
        poll_interval_ms: u64,
        checkpoint_interval_secs: u64,
    ) -> Self {
        Self {
            db,
            rpc,
            processor,
            network,
            event_types,
            start_block_height,
            // The chain rejects wider ranges anyway
            batch_size: batch_size.clamp(1, MAX_BLOCK_RANGE),
            poll_interval: Duration::from_millis(poll_interval_ms),
            checkpoint_interval: Duration::from_secs(checkpoint_interval_secs),
            stop_flag: Arc::new(AtomicBool::new(false)),
            status: Arc::new(PollerStatus::default()),
        }
    }

    pub fn status(&self) -> Arc<PollerStatus> {
        Arc::clone(&self.status)
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    fn should_stop(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    /// Resume from the persisted checkpoint, creating one just below the
    /// configured start height on first run so the first fetched block is
    /// exactly `start_block_height`.
    pub fn initialize(&self) -> Result<()> {
        self.status.set_state(PollerState::Initializing);
        let checkpoint = self
            .db
            .init_checkpoint(&self.network, self.start_block_height.saturating_sub(1))?;
        self.status
            .current_height
            .store(checkpoint + 1, Ordering::Relaxed);
        logger::info(
            LogTag::Poller,
            &format!(
                "[{}] Resuming from checkpoint {} (next block {})",
                self.network,
                checkpoint,
                checkpoint + 1
            ),
        );
        Ok(())
    }

    /// Refresh the chain watermark. Failure keeps the previous value; the
    /// poller keeps draining the span it already knows about.
    pub async fn refresh_watermark(&self) {
        match self.rpc.fetch_latest_height().await {
            Ok(height) => {
                self.status.latest_height.store(height, Ordering::Relaxed);
            }
            Err(e) => {
                logger::warning(
                    LogTag::Poller,
                    &format!("[{}] Watermark refresh failed: {}", self.network, e),
                );
            }
        }
    }

    /// Fetch and process the next block range. Returns the inclusive end of
    /// the processed range, or `None` when caught up to the watermark.
    /// On error the cursor does not advance, so the same range retries.
    pub async fn process_next_range(&self) -> Result<Option<u64>> {
        let current = self.status.current_height.load(Ordering::Relaxed);
        let latest = self.status.latest_height.load(Ordering::Relaxed);
        if current > latest {
            return Ok(None);
        }

        let end = (current + self.batch_size - 1).min(latest);
        let events = self
            .rpc
            .fetch_events(&self.event_types, current, end)
            .await?;

        if !events.is_empty() {
            logger::debug(
                LogTag::Poller,
                &format!(
                    "[{}] Blocks {}..={}: {} events",
                    self.network,
                    current,
                    end,
                    events.len()
                ),
            );
        }

        let outcome = self.processor.process_batch(&events).await?;
        self.status
            .events_applied
            .fetch_add(outcome.applied as u64, Ordering::Relaxed);
        self.status
            .events_failed
            .fetch_add(outcome.failed as u64, Ordering::Relaxed);
        self.status.batches_processed.fetch_add(1, Ordering::Relaxed);

        self.status.current_height.store(end + 1, Ordering::Relaxed);
        Ok(Some(end))
    }

    /// Persist the last fully processed height
    pub fn persist_progress(&self) -> Result<()> {
        let current = self.status.current_height.load(Ordering::Relaxed);
        if current == 0 {
            return Ok(());
        }
        self.db.persist_checkpoint(&self.network, current - 1)
    }

    /// Main loop; runs until the stop flag is set
    pub async fn run(&self) {
        if let Err(e) = self.initialize() {
            logger::error(
                LogTag::Poller,
                &format!("[{}] Poller init failed: {}", self.network, e),
            );
            self.status.set_state(PollerState::Stopped);
            return;
        }

        self.status.set_state(PollerState::Running);
        let mut last_persist = Instant::now();

        while !self.should_stop() {
            self.refresh_watermark().await;

            match self.process_next_range().await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    // Caught up; wait for new blocks
                    sleep(self.poll_interval).await;
                }
                Err(e) => {
                    logger::warning(
                        LogTag::Poller,
                        &format!(
                            "[{}] Batch failed, retrying same range: {}",
                            self.network, e
                        ),
                    );
                    // Jitter keeps multiple pollers from retrying in lockstep
                    let jitter = rand::thread_rng().gen_range(0..1000);
                    sleep(Duration::from_millis(ERROR_BACKOFF_MS + jitter)).await;
                }
            }

            // Interval flush runs on the caught-up path too, so a burst
            // followed by a quiet chain still gets its checkpoint recorded
            if last_persist.elapsed() >= self.checkpoint_interval {
                if let Err(e) = self.persist_progress() {
                    logger::error(
                        LogTag::Poller,
                        &format!("[{}] Checkpoint persist failed: {}", self.network, e),
                    );
                } else {
                    last_persist = Instant::now();
                }
            }
        }

        self.status.set_state(PollerState::Stopping);
        // Final flush regardless of the interval timer
        if let Err(e) = self.persist_progress() {
            logger::error(
                LogTag::Poller,
                &format!("[{}] Final checkpoint persist failed: {}", self.network, e),
            );
        }
        self.status.set_state(PollerState::Stopped);
        logger::info(LogTag::Poller, &format!("[{}] Poller stopped", self.network));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::signal::ActivitySignal;
    use crate::config::Config;
    use crate::rpc::{EventGuid, RawEvent, RpcResult};
    use crate::tokens::TokenResolver;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Fixed-height chain with a preset event log
    struct ScriptedChain {
        latest: u64,
        events: Vec<RawEvent>,
    }

    #[async_trait]
    impl ChainRpc for ScriptedChain {
        async fn fetch_latest_height(&self) -> RpcResult<u64> {
            Ok(self.latest)
        }

        async fn fetch_events(
            &self,
            event_types: &[String],
            start_block: u64,
            end_block: u64,
        ) -> RpcResult<Vec<RawEvent>> {
            Ok(self
                .events
                .iter()
                .filter(|e| {
                    e.block_height >= start_block
                        && e.block_height <= end_block
                        && event_types.contains(&e.event_type)
                })
                .cloned()
                .collect())
        }

        async fn call_view(
            &self,
            _function: &str,
            _type_arguments: Vec<String>,
            _arguments: Vec<Value>,
        ) -> RpcResult<Value> {
            Ok(json!([{ "name": "Stub", "symbol": "STB", "decimals": 6 }]))
        }
    }

    fn trade_event(modules: &crate::config::ModuleConfig, seq: i64, block: u64) -> RawEvent {
        RawEvent {
            event_type: modules.pump_event("TradeEvent"),
            guid: Some(EventGuid {
                creation_number: "7".to_string(),
                account_address: "0xpump".to_string(),
            }),
            sequence_number: Some(seq),
            transaction_hash: Some(format!("0xtx{}", seq)),
            block_height: block,
            timestamp: 1_700_000_000 + seq,
            data: json!({
                "is_buy": seq % 2 == 0,
                "supra_amount": "100000000",
                "token_address": "0xtoken",
                "token_amount": "5000000",
                "user": "0xuser",
                "virtual_supra_reserves": "900000000",
                "virtual_token_reserves": "450000000"
            }),
        }
    }

    fn pair_event(modules: &crate::config::ModuleConfig, block: u64) -> RawEvent {
        RawEvent {
            event_type: modules.amm_event("PairCreatedEvent"),
            guid: Some(EventGuid {
                creation_number: "2".to_string(),
                account_address: "0xamm".to_string(),
            }),
            sequence_number: Some(1),
            transaction_hash: Some("0xpairtx".to_string()),
            block_height: block,
            timestamp: 1_700_000_100,
            data: json!({
                "pair": "0xpair1",
                "creator": "0xcreator",
                "token0": "0xtoken",
                "token1": "0x1::supra_coin::SupraCoin",
                "reserve0": "1000000",
                "reserve1": "2000000"
            }),
        }
    }

    fn build_poller(
        db: &Database,
        chain: Arc<ScriptedChain>,
        start: u64,
        poll_interval_ms: u64,
        checkpoint_interval_secs: u64,
    ) -> EventPoller {
        let network = Config::default().networks[0].clone();
        let resolver = Arc::new(TokenResolver::new(
            db.clone(),
            chain.clone() as Arc<dyn ChainRpc>,
            network.modules.clone(),
        ));
        let processor = EventProcessor::new(
            db.clone(),
            resolver,
            Arc::new(ActivitySignal::new()),
            network.name.clone(),
            network.modules.clone(),
        );
        EventPoller::new(
            db.clone(),
            chain as Arc<dyn ChainRpc>,
            processor,
            network.name.clone(),
            network.event_types(),
            start,
            10,
            poll_interval_ms,
            checkpoint_interval_secs,
        )
    }

    #[tokio::test]
    async fn test_first_run_starts_at_configured_height() {
        let db = Database::open_in_memory().unwrap();
        let chain = Arc::new(ScriptedChain {
            latest: 115,
            events: Vec::new(),
        });
        let poller = build_poller(&db, chain, 100, 1000, 30);

        poller.initialize().unwrap();
        assert_eq!(poller.status().current_height(), 100);
        assert_eq!(db.get_checkpoint("testnet").unwrap(), Some(99));
    }

    #[tokio::test]
    async fn test_catches_up_and_restarts_without_duplicates() {
        let modules = Config::default().networks[0].modules.clone();
        let db = Database::open_in_memory().unwrap();
        let chain = Arc::new(ScriptedChain {
            latest: 115,
            events: vec![
                trade_event(&modules, 1, 101),
                trade_event(&modules, 2, 104),
                trade_event(&modules, 3, 109),
                pair_event(&modules, 107),
            ],
        });

        let poller = build_poller(&db, chain.clone(), 100, 1000, 30);
        poller.initialize().unwrap();
        poller.refresh_watermark().await;
        assert_eq!(poller.status().latest_height(), 115);

        // First range covers 100..=109 and ingests all four events
        let end = poller.process_next_range().await.unwrap();
        assert_eq!(end, Some(109));
        assert_eq!(db.count_rows("trade_events", "testnet").unwrap(), 3);
        assert_eq!(db.count_rows("amm_pairs", "testnet").unwrap(), 1);

        // Crash before any persist: checkpoint still says 99
        assert_eq!(db.get_checkpoint("testnet").unwrap(), Some(99));
        drop(poller);

        // Restart re-fetches the same range; the ledger absorbs re-delivery
        let poller = build_poller(&db, chain, 100, 1000, 30);
        poller.initialize().unwrap();
        assert_eq!(poller.status().current_height(), 100);
        poller.refresh_watermark().await;

        while poller.process_next_range().await.unwrap().is_some() {}
        assert_eq!(poller.status().current_height(), 116);
        assert_eq!(db.count_rows("trade_events", "testnet").unwrap(), 3);
        assert_eq!(db.count_rows("amm_pairs", "testnet").unwrap(), 1);

        poller.persist_progress().unwrap();
        assert_eq!(db.get_checkpoint("testnet").unwrap(), Some(115));
    }

    #[tokio::test]
    async fn test_resumes_after_persisted_checkpoint() {
        let db = Database::open_in_memory().unwrap();
        let chain = Arc::new(ScriptedChain {
            latest: 120,
            events: Vec::new(),
        });

        db.persist_checkpoint("testnet", 109).unwrap();
        let poller = build_poller(&db, chain, 100, 1000, 30);
        poller.initialize().unwrap();
        assert_eq!(poller.status().current_height(), 110);

        poller.refresh_watermark().await;
        let end = poller.process_next_range().await.unwrap();
        assert_eq!(end, Some(119));
    }

    #[tokio::test]
    async fn test_checkpoint_persists_while_caught_up() {
        let db = Database::open_in_memory().unwrap();
        let chain = Arc::new(ScriptedChain {
            latest: 109,
            events: Vec::new(),
        });

        // Short interval: one range (100..=109) processes immediately, then
        // the poller idles caught up while the chain stays quiet
        let poller = Arc::new(build_poller(&db, chain, 100, 50, 1));
        let stop = poller.stop_handle();
        let task = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.run().await })
        };

        sleep(Duration::from_millis(2500)).await;
        // The interval flush must advance the checkpoint without a shutdown
        assert_eq!(db.get_checkpoint("testnet").unwrap(), Some(109));

        stop.store(true, Ordering::Release);
        task.await.unwrap();
        assert_eq!(poller.status().state(), PollerState::Stopped);
    }
}
