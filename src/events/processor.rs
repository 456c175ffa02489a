//! Batch event processor
//!
//! Processing is two-phase. The prefetch phase resolves token metadata over
//! the network without any transaction held. The write phase runs in chunked
//! transactions with a savepoint per event, so one bad event rolls back its
//! own writes (ledger row included) without poisoning its neighbors.
//!
//! Error discipline: a handler failure is contained (savepoint rollback, the
//! failure recorded on the ledger row after the chunk commits, processing
//! continues). A ledger write failure aborts the whole chunk and propagates,
//! because without the ledger we can no longer promise idempotency.

use crate::aggregator::signal::ActivitySignal;
use crate::config::ModuleConfig;
use crate::database::events as ledger;
use crate::database::models::EventKey;
use crate::database::Database;
use crate::events::handlers::{
    handle_game_result, handle_migration, handle_pair_created, handle_pool_created,
    handle_staking_registered, handle_trade, HandlerContext,
};
use crate::events::types::{ChainEvent, EventPayload};
use crate::logger::{self, LogTag};
use crate::rpc::RawEvent;
use crate::tokens::TokenResolver;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Events per write transaction
const CHUNK_SIZE: usize = 10;

/// Cap on stored handler error messages
const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The idempotency ledger could not be written; the batch must be retried
    #[error("idempotency ledger write failed: {0}")]
    Ledger(#[source] anyhow::Error),
}

/// Counts for one processed batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Events whose handler applied a new row
    pub applied: usize,
    /// Events already processed, or whose rows already existed
    pub skipped: usize,
    /// Events whose handler failed; recorded on the ledger, retried next pass
    pub failed: usize,
}

struct FailedEvent {
    key: EventKey,
    block_height: u64,
    message: String,
}

pub struct EventProcessor {
    db: Database,
    resolver: Arc<TokenResolver>,
    signal: Arc<ActivitySignal>,
    network: String,
    modules: ModuleConfig,
}

impl EventProcessor {
    pub fn new(
        db: Database,
        resolver: Arc<TokenResolver>,
        signal: Arc<ActivitySignal>,
        network: String,
        modules: ModuleConfig,
    ) -> Self {
        Self {
            db,
            resolver,
            signal,
            network,
            modules,
        }
    }

    /// Process one fetched batch. Re-delivery of any event is safe.
    pub async fn process_batch(&self, raw_events: &[RawEvent]) -> Result<BatchOutcome, ProcessorError> {
        if raw_events.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let events: Vec<ChainEvent> = raw_events
            .iter()
            .map(|raw| ChainEvent::classify(raw, &self.network, &self.modules))
            .collect();

        let pending = self.filter_pending(&events)?;
        let resolved = self.prefetch_tokens(&pending).await;

        let mut outcome = BatchOutcome {
            skipped: events.len() - pending.len(),
            ..Default::default()
        };
        let mut trades_applied = false;

        for chunk in pending.chunks(CHUNK_SIZE) {
            let ctx = HandlerContext {
                resolver: &self.resolver,
                resolved: &resolved,
            };

            let (chunk_outcome, chunk_trades, failures) = self
                .db
                .with_transaction(|tx| {
                    let mut applied = 0usize;
                    let mut skipped = 0usize;
                    let mut failed = 0usize;
                    let mut trades = false;
                    let mut failures: Vec<FailedEvent> = Vec::new();

                    for event in chunk {
                        let key = event.idempotency_key();
                        // Re-check inside the transaction; another pass may
                        // have finished this event since the filter ran
                        if ledger::is_event_processed(tx, &key)? {
                            skipped += 1;
                            continue;
                        }

                        let mut sp = tx.savepoint()?;
                        ledger::ensure_tracking(&sp, &key, event.block_height)?;

                        match dispatch(&sp, &ctx, event) {
                            Ok(event_applied) => {
                                ledger::mark_processed(&sp, &key)?;
                                sp.commit()?;
                                if event_applied {
                                    applied += 1;
                                    if matches!(event.payload, EventPayload::Trade(_)) {
                                        trades = true;
                                    }
                                } else {
                                    skipped += 1;
                                }
                            }
                            Err(e) => {
                                // Savepoint drop rolls back the event's writes
                                drop(sp);
                                failed += 1;
                                failures.push(FailedEvent {
                                    key,
                                    block_height: event.block_height,
                                    message: truncate(&format!("{:#}", e), MAX_ERROR_LEN),
                                });
                            }
                        }
                    }

                    Ok((
                        BatchOutcome {
                            applied,
                            skipped,
                            failed,
                        },
                        trades,
                        failures,
                    ))
                })
                .map_err(ProcessorError::Ledger)?;

            outcome.applied += chunk_outcome.applied;
            outcome.skipped += chunk_outcome.skipped;
            outcome.failed += chunk_outcome.failed;
            trades_applied = trades_applied || chunk_trades;

            // Failure records go in after the chunk commits: the savepoint
            // rollback removed the tracking rows, and these writes must not
            // ride a transaction that could itself abort
            for failure in failures {
                logger::warning(
                    LogTag::Processor,
                    &format!(
                        "[{}] Event failed ({} seq {}): {}",
                        self.network,
                        failure.key.event_type,
                        failure.key.sequence_number,
                        failure.message
                    ),
                );
                if let Err(e) =
                    self.db
                        .record_event_error(&failure.key, failure.block_height, &failure.message)
                {
                    logger::error(
                        LogTag::Processor,
                        &format!("[{}] Failed to record event error: {}", self.network, e),
                    );
                }
            }
        }

        if trades_applied {
            self.signal.mark(&self.network);
        }

        logger::debug(
            LogTag::Processor,
            &format!(
                "[{}] Batch done: {} applied, {} skipped, {} failed",
                self.network, outcome.applied, outcome.skipped, outcome.failed
            ),
        );

        Ok(outcome)
    }

    /// Drop events the ledger already marks processed
    fn filter_pending(&self, events: &[ChainEvent]) -> Result<Vec<ChainEvent>, ProcessorError> {
        self.db
            .with_connection(|conn| {
                let mut pending = Vec::with_capacity(events.len());
                for event in events {
                    if !ledger::is_event_processed(conn, &event.idempotency_key())? {
                        pending.push(event.clone());
                    }
                }
                Ok(pending)
            })
            .map_err(ProcessorError::Ledger)
    }

    /// Resolve metadata for every token address the pending events reference.
    /// Failures leave unfetched entries; handlers still get a minimal row.
    async fn prefetch_tokens(&self, events: &[ChainEvent]) -> HashMap<String, crate::database::models::Token> {
        let mut resolved = HashMap::new();
        for event in events {
            for address in referenced_token_addresses(&event.payload) {
                if resolved.contains_key(address) {
                    continue;
                }
                let token = self.resolver.resolve(&self.network, address).await;
                resolved.insert(address.to_string(), token);
            }
        }
        resolved
    }
}

/// Addresses whose metadata must be resolved before the event's handler runs
fn referenced_token_addresses(payload: &EventPayload) -> Vec<&str> {
    match payload {
        EventPayload::PairCreated(p) => vec![p.token0.as_str(), p.token1.as_str()],
        EventPayload::StakingRegistered(p) => vec![
            p.stake_token_address.as_str(),
            p.reward_token_address.as_str(),
        ],
        _ => Vec::new(),
    }
}

/// Exhaustive dispatch over the payload union
fn dispatch(
    conn: &rusqlite::Connection,
    ctx: &HandlerContext,
    event: &ChainEvent,
) -> anyhow::Result<bool> {
    match &event.payload {
        EventPayload::Trade(p) => handle_trade(conn, event, p),
        EventPayload::PoolCreated(p) => handle_pool_created(conn, ctx, event, p),
        EventPayload::PairCreated(p) => handle_pair_created(conn, ctx, event, p),
        EventPayload::Migration(p) => handle_migration(conn, event, p),
        EventPayload::GameResult(p) => handle_game_result(conn, event, p),
        EventPayload::StakingRegistered(p) => handle_staking_registered(conn, ctx, event, p),
        EventPayload::Unknown => {
            logger::warning(
                LogTag::Processor,
                &format!(
                    "[{}] Unhandled event type {}, marking processed",
                    event.network, event.event_type
                ),
            );
            Ok(false)
        }
        EventPayload::Malformed(detail) => Err(anyhow::anyhow!("malformed event data: {}", detail)),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}
