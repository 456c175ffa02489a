use anyhow::Result;
use spike_indexer::aggregator::ActivitySignal;
use spike_indexer::config::Config;
use spike_indexer::database::Database;
use spike_indexer::indexer::IndexerManager;
use spike_indexer::logger::{self, LogTag};
use spike_indexer::{arguments, scheduler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<()> {
    arguments::set_cmd_args(std::env::args().collect());

    if arguments::is_help_requested() {
        arguments::print_help();
        return Ok(());
    }

    logger::init();
    logger::info(LogTag::System, "Spike indexer starting");

    let config = Config::load(arguments::config_path())?;
    let db = Database::open(&config.database.path)?;
    let signal = Arc::new(ActivitySignal::new());

    // --network limits the run to one configured network
    let selected: Vec<_> = match arguments::network_override() {
        Some(name) => match config.network(&name) {
            Some(network) => vec![network.clone()],
            None => anyhow::bail!("unknown network '{}' in --network", name),
        },
        None => config.networks.clone(),
    };
    if selected.is_empty() {
        anyhow::bail!("no networks configured");
    }

    let mut manager = IndexerManager::new();
    for network in &selected {
        manager.start_network(db.clone(), Arc::clone(&signal), network)?;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let aggregation = scheduler::spawn_aggregation_tasks(&db, &signal, &config, &shutdown);

    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Release);
        })?;
    }

    logger::info(
        LogTag::System,
        &format!("Indexing {} network(s); Ctrl+C to stop", selected.len()),
    );

    while !shutdown.load(Ordering::Acquire) {
        sleep(Duration::from_millis(500)).await;
    }

    logger::info(LogTag::System, "Shutdown requested, flushing checkpoints");
    manager.stop_all().await;
    // Aggregation passes are transactional; aborting between ticks is safe
    for handle in aggregation {
        handle.abort();
    }

    logger::info(LogTag::System, "Spike indexer stopped");
    Ok(())
}
