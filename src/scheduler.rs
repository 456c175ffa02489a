//! Periodic aggregation task loops
//!
//! One OHLC loop and one TVL loop per network. Cadences come from config;
//! the OHLC tick is cheap when the activity signal is clear. Loops exit when
//! the shared shutdown flag flips.

use crate::aggregator::{ActivitySignal, OhlcBuilder, TvlCalculator};
use crate::config::Config;
use crate::database::Database;
use crate::logger::{self, LogTag};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;

pub fn spawn_aggregation_tasks(
    db: &Database,
    signal: &Arc<ActivitySignal>,
    config: &Config,
    shutdown: &Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for network in &config.networks {
        let ohlc = OhlcBuilder::new(db.clone(), Arc::clone(signal), network.name.clone());
        let ohlc_period = Duration::from_secs(config.aggregation.ohlc_interval_secs);
        let ohlc_shutdown = Arc::clone(shutdown);
        let ohlc_network = network.name.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(ohlc_period);
            loop {
                ticker.tick().await;
                if ohlc_shutdown.load(Ordering::Acquire) {
                    break;
                }
                if let Err(e) = ohlc.run() {
                    logger::error(
                        LogTag::Ohlc,
                        &format!("[{}] Candle pass failed: {}", ohlc_network, e),
                    );
                }
            }
        }));

        let tvl = TvlCalculator::new(db.clone(), network.name.clone());
        let tvl_period = Duration::from_secs(config.aggregation.tvl_interval_secs);
        let tvl_shutdown = Arc::clone(shutdown);
        let tvl_network = network.name.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(tvl_period);
            // Skip the immediate first tick; there is nothing to value until
            // ingestion has run for a while
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tvl_shutdown.load(Ordering::Acquire) {
                    break;
                }
                if let Err(e) = tvl.run() {
                    logger::error(
                        LogTag::Tvl,
                        &format!("[{}] TVL pass failed: {}", tvl_network, e),
                    );
                }
            }
        }));
    }

    handles
}
