//! PaperDesk demo binary
//!
//! Loads the desk configuration, registers the configured instruments
//! against an in-process feed, and drives a short scripted session:
//! a synthetic random-walk book, a handful of resting and marketable
//! orders, funding on perpetuals, and a state flush on exit.

use anyhow::{Context, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use paperdesk::config::DeskConfig;
use paperdesk::desk::PaperDesk;
use paperdesk::engine::OrderRequest;
use paperdesk::feed::{MarketDataFeed, SlotFeed};
use paperdesk::fees::FlatRateFees;
use paperdesk::portfolio::PaperPortfolio;
use paperdesk::state::StateStore;
use paperdesk::types::{BookLevel, InstrumentId, OrderBookSnapshot, OrderType, Side};

/// Thin handle so every registration can share one in-process feed.
struct SharedFeed(Arc<SlotFeed>);

impl MarketDataFeed for SharedFeed {
    fn get_book(&self, instrument: &InstrumentId) -> Option<OrderBookSnapshot> {
        self.0.get_book(instrument)
    }
    fn get_mid_price(&self, instrument: &InstrumentId) -> Option<Decimal> {
        self.0.get_mid_price(instrument)
    }
    fn get_funding_rate(&self, instrument: &InstrumentId) -> Decimal {
        self.0.get_funding_rate(instrument)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = DeskConfig::load().context("Configuration load failed")?;
    info!(config = %config.digest(), "[MAIN] PaperDesk starting");

    let mut portfolio = PaperPortfolio::new(config.desk.valuation_asset.clone(), config.risk.clone());
    for (asset, amount) in &config.ledger.deposits {
        portfolio.deposit(asset, *amount);
    }

    let store = StateStore::new(
        PathBuf::from(&config.persistence.state_file),
        config.persistence.min_interval_ms,
    );
    let mut desk = PaperDesk::new(portfolio, config.desk.seed, config.desk.event_log_capacity)
        .with_state_store(store)
        .context("State restore failed")?;

    let feed = Arc::new(SlotFeed::new());
    let mut instruments = Vec::new();
    for cfg in &config.instruments {
        let spec = cfg.to_spec()?;
        instruments.push(spec.id.clone());
        desk.register_queue_model(
            spec.clone(),
            Box::new(SharedFeed(Arc::clone(&feed))),
            config.fill.clone(),
            Box::new(FlatRateFees::from_spec(&spec)),
            config.latency,
            config.engine.clone(),
        )?;
    }
    if instruments.is_empty() {
        anyhow::bail!("no instruments configured (add an [[instruments]] entry)");
    }

    run_session(&mut desk, &feed, &instruments, config.desk.seed)?;
    Ok(())
}

/// Scripted session: 600 ticks of a random-walk book at 100ms per tick.
fn run_session(
    desk: &mut PaperDesk,
    feed: &Arc<SlotFeed>,
    instruments: &[InstrumentId],
    seed: u64,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = Utc::now().timestamp_millis();
    let mut mid = dec!(100.00);

    for step in 0i64..600 {
        let now = start + step * 100;

        // Synthetic book: one-tick random walk, fixed spread and depth.
        let drift = Decimal::from_f64(rng.gen_range(-0.05..=0.05)).unwrap_or(Decimal::ZERO);
        mid = (mid + drift).max(dec!(1));
        for id in instruments {
            feed.publish_book(
                id,
                OrderBookSnapshot::normalize(
                    vec![BookLevel::new(mid - dec!(0.05), dec!(5))],
                    vec![BookLevel::new(mid + dec!(0.05), dec!(5))],
                    now,
                ),
            );
            feed.publish_funding_rate(id, dec!(0.0001));
        }

        // A resting bid early, a marketable order mid-session.
        if step == 10 {
            for id in instruments {
                let (_, events) = desk.submit_order(
                    id,
                    OrderRequest {
                        side: Side::Buy,
                        order_type: OrderType::LimitMaker,
                        price: Some(mid - dec!(0.10)),
                        quantity: dec!(0.5),
                    },
                    now,
                )?;
                info!(instrument = %id, event = ?events.first(), "[MAIN] Resting bid placed");
            }
        }
        if step == 300 {
            for id in instruments {
                desk.submit_order(
                    id,
                    OrderRequest {
                        side: Side::Sell,
                        order_type: OrderType::Market,
                        price: None,
                        quantity: dec!(0.25),
                    },
                    now,
                )?;
            }
        }

        desk.tick(now);
    }

    let shutdown_at = start + 600 * 100;
    desk.cancel_all(shutdown_at);
    desk.shutdown(shutdown_at);

    info!(
        events = desk.event_log().len(),
        equity = %desk.portfolio().last_equity(),
        "[MAIN] Session complete"
    );
    for (instrument, position) in desk.portfolio().positions() {
        info!(
            instrument = %instrument,
            quantity = %position.quantity,
            realized = %position.realized_pnl,
            fees = %position.total_fees_paid,
            "[MAIN] Final position"
        );
    }
    Ok(())
}
