//! OHLC candle builder
//!
//! Consumes unprocessed trades into fixed 60-second price candles. Prices are
//! computed with exact decimal arithmetic (quote amount over token amount,
//! each adjusted by its decimals); volume is the quote amount. The pass runs
//! in one transaction so candle writes and the consumption flags land
//! together.

use crate::aggregator::signal::ActivitySignal;
use crate::database::events::{load_unprocessed_trades, mark_trades_processed};
use crate::database::models::Candle;
use crate::database::tokens::load_decimals_map;
use crate::database::{candles, Database};
use crate::logger::{self, LogTag};
use anyhow::Result;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// Quote-asset (SUPRA) decimals
pub const SUPRA_DECIMALS: u32 = 8;

/// Candle bucket width in seconds
pub const BUCKET_SECS: i64 = 60;

/// Granularity label stored with each candle
pub const GRANULARITY: &str = "1m";

struct CandleAccum {
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

pub struct OhlcBuilder {
    db: Database,
    signal: Arc<ActivitySignal>,
    network: String,
}

impl OhlcBuilder {
    pub fn new(db: Database, signal: Arc<ActivitySignal>, network: String) -> Self {
        Self {
            db,
            signal,
            network,
        }
    }

    /// One builder pass, gated on the activity signal. The signal clears only
    /// after a pass that consumed something; a failure or an empty pass (all
    /// pending trades still waiting on metadata) leaves it set so the next
    /// tick tries again.
    pub fn run(&self) -> Result<()> {
        if !self.signal.is_marked(&self.network) {
            return Ok(());
        }

        let consumed = self.build_candles()?;
        if consumed > 0 {
            self.signal.clear(&self.network);
            logger::debug(
                LogTag::Ohlc,
                &format!("[{}] Consumed {} trades into candles", self.network, consumed),
            );
        }
        Ok(())
    }

    /// Group pending trades into (token, bucket) candles and consume them.
    /// Returns the number of trades consumed.
    pub fn build_candles(&self) -> Result<usize> {
        let network = self.network.clone();
        self.db.with_transaction(move |tx| {
            let trades = load_unprocessed_trades(tx, &network)?;
            if trades.is_empty() {
                return Ok(0);
            }
            let decimals = load_decimals_map(tx, &network)?;

            let mut consumed: Vec<i64> = Vec::new();
            // BTreeMap keeps candle writes in a stable order; trades arrive
            // timestamp-ordered so first/last per bucket are open/close
            let mut buckets: BTreeMap<(String, i64), CandleAccum> = BTreeMap::new();

            for (id, trade) in &trades {
                let token_decimals = match decimals.get(&trade.token_address) {
                    Some(d) => *d,
                    // Metadata not resolved yet; leave the trade pending so a
                    // later pass prices it
                    None => continue,
                };

                let supra = adjust_amount(&trade.supra_amount, SUPRA_DECIMALS);
                let tokens = adjust_amount(&trade.token_amount, token_decimals);
                let (supra, tokens) = match (supra, tokens) {
                    (Some(s), Some(t)) => (s, t),
                    _ => {
                        logger::warning(
                            LogTag::Ohlc,
                            &format!(
                                "[{}] Unparseable amounts on trade {} ({} / {})",
                                network, id, trade.supra_amount, trade.token_amount
                            ),
                        );
                        consumed.push(*id);
                        continue;
                    }
                };

                if tokens.is_zero() {
                    // No price can ever come out of this trade
                    consumed.push(*id);
                    continue;
                }

                let price = supra / tokens;
                let bucket = trade.timestamp - trade.timestamp.rem_euclid(BUCKET_SECS);

                buckets
                    .entry((trade.token_address.clone(), bucket))
                    .and_modify(|c| {
                        c.high = c.high.max(price);
                        c.low = c.low.min(price);
                        c.close = price;
                        c.volume += supra;
                    })
                    .or_insert(CandleAccum {
                        open: price,
                        high: price,
                        low: price,
                        close: price,
                        volume: supra,
                    });
                consumed.push(*id);
            }

            for ((token_address, bucket), accum) in &buckets {
                candles::upsert_candle(
                    tx,
                    &Candle {
                        network: network.clone(),
                        token_address: token_address.clone(),
                        timestamp: *bucket,
                        granularity: GRANULARITY.to_string(),
                        open: accum.open,
                        high: accum.high,
                        low: accum.low,
                        close: accum.close,
                        volume: accum.volume,
                    },
                )?;
            }

            mark_trades_processed(tx, &consumed)?;
            Ok(consumed.len())
        })
    }
}

/// Raw integer amount string adjusted by decimals, exactly
fn adjust_amount(raw: &str, decimals: u32) -> Option<Decimal> {
    let mut value = Decimal::from_str(raw).ok()?;
    value.set_scale(decimals).ok()?;
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::events::insert_trade_if_absent;
    use crate::database::models::{MetadataStandard, Token, TradeRecord};
    use crate::database::tokens::insert_token_if_absent;

    fn token(network: &str, address: &str, decimals: u32) -> Token {
        Token {
            network: network.to_string(),
            address: address.to_string(),
            name: Some("Test".to_string()),
            symbol: Some("TST".to_string()),
            decimals: Some(decimals),
            icon_uri: None,
            project_uri: None,
            metadata_standard: MetadataStandard::FungibleAsset,
            original_coin_type: None,
            metadata_fetched: true,
            last_metadata_attempt: 0,
        }
    }

    fn trade(seq: i64, timestamp: i64, supra: &str, tokens: &str) -> TradeRecord {
        TradeRecord {
            network: "testnet".to_string(),
            event_type: "0x0::pump_supra::TradeEvent".to_string(),
            creation_number: "7".to_string(),
            account_address: "0xpump".to_string(),
            sequence_number: seq,
            timestamp,
            is_buy: true,
            supra_amount: supra.to_string(),
            token_address: "0xtoken".to_string(),
            token_amount: tokens.to_string(),
            user: "0xuser".to_string(),
            virtual_supra_reserves: "0".to_string(),
            virtual_token_reserves: "0".to_string(),
        }
    }

    fn builder(db: &Database) -> OhlcBuilder {
        let signal = Arc::new(ActivitySignal::new());
        signal.mark("testnet");
        OhlcBuilder::new(db.clone(), signal, "testnet".to_string())
    }

    #[test]
    fn test_adjust_amount() {
        assert_eq!(
            adjust_amount("200000000", 8),
            Some(Decimal::from_str("2").unwrap())
        );
        assert_eq!(
            adjust_amount("500000", 6),
            Some(Decimal::from_str("0.5").unwrap())
        );
        assert_eq!(adjust_amount("not-a-number", 8), None);
    }

    #[test]
    fn test_trades_group_into_buckets() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            insert_token_if_absent(conn, &token("testnet", "0xtoken", 6)).map(|_| ())
        })
        .unwrap();

        // Bucket [0,60): prices 2, 1.5, 4. Bucket [60,120): price 1.
        db.with_connection(|conn| {
            insert_trade_if_absent(conn, &trade(1, 10, "200000000", "1000000"))?;
            insert_trade_if_absent(conn, &trade(2, 25, "300000000", "2000000"))?;
            insert_trade_if_absent(conn, &trade(3, 50, "400000000", "1000000"))?;
            insert_trade_if_absent(conn, &trade(4, 70, "100000000", "1000000"))?;
            Ok(())
        })
        .unwrap();

        let ohlc = builder(&db);
        ohlc.run().unwrap();
        assert!(!ohlc.signal.is_marked("testnet"));

        let first = db
            .get_candle_row("testnet", "0xtoken", 0, GRANULARITY)
            .unwrap()
            .unwrap();
        assert_eq!(first.open, Decimal::from_str("2").unwrap());
        assert_eq!(first.high, Decimal::from_str("4").unwrap());
        assert_eq!(first.low, Decimal::from_str("1.5").unwrap());
        assert_eq!(first.close, Decimal::from_str("4").unwrap());
        assert_eq!(first.volume, Decimal::from_str("9").unwrap());

        let second = db
            .get_candle_row("testnet", "0xtoken", 60, GRANULARITY)
            .unwrap()
            .unwrap();
        assert_eq!(second.open, Decimal::from_str("1").unwrap());
        assert_eq!(second.volume, Decimal::from_str("1").unwrap());

        // All trades consumed: a second pass is a no-op
        assert_eq!(ohlc.build_candles().unwrap(), 0);
    }

    #[test]
    fn test_unknown_decimals_leaves_trade_pending() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            insert_trade_if_absent(conn, &trade(1, 10, "200000000", "1000000")).map(|_| ())
        })
        .unwrap();

        let ohlc = builder(&db);
        ohlc.run().unwrap();

        // Nothing consumed, so the signal must survive for the next tick
        assert!(ohlc.signal.is_marked("testnet"));

        // Metadata arrives; the next pass prices the trade and clears the signal
        db.with_connection(|conn| {
            insert_token_if_absent(conn, &token("testnet", "0xtoken", 6)).map(|_| ())
        })
        .unwrap();
        ohlc.run().unwrap();
        assert!(!ohlc.signal.is_marked("testnet"));
        assert!(db
            .get_candle_row("testnet", "0xtoken", 0, GRANULARITY)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_zero_token_amount_is_consumed_without_candle() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            insert_token_if_absent(conn, &token("testnet", "0xtoken", 6))?;
            insert_trade_if_absent(conn, &trade(1, 10, "200000000", "0"))?;
            Ok(())
        })
        .unwrap();

        let ohlc = builder(&db);
        assert_eq!(ohlc.build_candles().unwrap(), 1);
        assert!(db
            .get_candle_row("testnet", "0xtoken", 0, GRANULARITY)
            .unwrap()
            .is_none());
    }
}
