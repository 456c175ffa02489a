//! Per-network service lifecycle
//!
//! Each configured network gets its own poller task with explicit handles
//! held here; there is no global registry, so two managers (or a test and
//! the binary) never share state by accident.

use crate::aggregator::ActivitySignal;
use crate::config::NetworkConfig;
use crate::database::Database;
use crate::events::EventProcessor;
use crate::logger::{self, LogTag};
use crate::poller::{EventPoller, PollerState, PollerStatus};
use crate::rpc::{ChainRpc, RpcClient};
use crate::tokens::TokenResolver;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

struct NetworkService {
    stop_flag: Arc<AtomicBool>,
    status: Arc<PollerStatus>,
    handle: JoinHandle<()>,
}

/// Point-in-time view of one network's poller
pub struct NetworkStatus {
    pub network: String,
    pub state: PollerState,
    pub current_height: u64,
    pub latest_height: u64,
    pub events_applied: u64,
    pub events_failed: u64,
}

#[derive(Default)]
pub struct IndexerManager {
    services: HashMap<String, NetworkService>,
}

impl IndexerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a poller for a network. Starting an already-running network is
    /// rejected rather than silently replacing the old task.
    pub fn start_network(
        &mut self,
        db: Database,
        signal: Arc<ActivitySignal>,
        config: &NetworkConfig,
    ) -> anyhow::Result<()> {
        if self.services.contains_key(&config.name) {
            anyhow::bail!("network '{}' is already running", config.name);
        }

        let rpc: Arc<dyn ChainRpc> =
            Arc::new(RpcClient::new(&config.rpc_url, config.max_requests_per_second));
        let resolver = Arc::new(TokenResolver::new(
            db.clone(),
            Arc::clone(&rpc),
            config.modules.clone(),
        ));
        let processor = EventProcessor::new(
            db.clone(),
            resolver,
            signal,
            config.name.clone(),
            config.modules.clone(),
        );
        let poller = Arc::new(EventPoller::new(
            db,
            rpc,
            processor,
            config.name.clone(),
            config.event_types(),
            config.start_block_height,
            config.batch_size,
            config.poll_interval_ms,
            config.checkpoint_interval_secs,
        ));

        let stop_flag = poller.stop_handle();
        let status = poller.status();
        let handle = tokio::spawn({
            let poller = Arc::clone(&poller);
            async move { poller.run().await }
        });

        logger::info(
            LogTag::System,
            &format!("Started indexer for network '{}'", config.name),
        );
        self.services.insert(
            config.name.clone(),
            NetworkService {
                stop_flag,
                status,
                handle,
            },
        );
        Ok(())
    }

    pub fn is_running(&self, network: &str) -> bool {
        self.services.contains_key(network)
    }

    pub fn status(&self) -> Vec<NetworkStatus> {
        let mut statuses: Vec<NetworkStatus> = self
            .services
            .iter()
            .map(|(network, service)| NetworkStatus {
                network: network.clone(),
                state: service.status.state(),
                current_height: service.status.current_height(),
                latest_height: service.status.latest_height(),
                events_applied: service.status.events_applied(),
                events_failed: service.status.events_failed(),
            })
            .collect();
        statuses.sort_by(|a, b| a.network.cmp(&b.network));
        statuses
    }

    /// Signal every poller to stop and wait for their final checkpoint flush
    pub async fn stop_all(&mut self) {
        for (network, service) in &self.services {
            logger::info(LogTag::System, &format!("Stopping indexer for '{}'", network));
            service.stop_flag.store(true, Ordering::Release);
        }
        for (network, service) in self.services.drain() {
            if let Err(e) = service.handle.await {
                logger::error(
                    LogTag::System,
                    &format!("Poller task for '{}' panicked: {}", network, e),
                );
            }
        }
    }
}
