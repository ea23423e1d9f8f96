//! Market data feed boundary
//!
//! The core consumes one protocol shape — books, mids, funding rates —
//! and never a concrete exchange adapter. The one piece of threading
//! the core does own is the handoff: a feed thread publishes into a
//! single-slot, latest-wins queue that never blocks and never makes the
//! tick thread wait. A stalled feed must never stall matching.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::types::{InstrumentId, OrderBookSnapshot};

/// What the desk needs from a market-data source. Concrete adapters
/// (exchange APIs, recorded replays, host connectors) live outside the
/// core and implement this.
#[cfg_attr(test, mockall::automock)]
pub trait MarketDataFeed: Send {
    fn get_book(&self, instrument: &InstrumentId) -> Option<OrderBookSnapshot>;
    fn get_mid_price(&self, instrument: &InstrumentId) -> Option<Decimal>;
    fn get_funding_rate(&self, instrument: &InstrumentId) -> Decimal;
}

/// Single-slot, latest-wins, non-blocking handoff between a producer
/// thread and the tick thread.
///
/// `publish` overwrites whatever is in the slot; `take` drains it, and
/// reports "no new data" (`None`) instead of waiting — including when
/// the producer happens to hold the slot at that instant.
#[derive(Debug, Default)]
pub struct SnapshotSlot<T> {
    slot: Mutex<Option<T>>,
}

impl<T> SnapshotSlot<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Producer side: replace the slot content. Latest wins.
    pub fn publish(&self, value: T) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(value);
        }
    }

    /// Consumer side: drain the slot without blocking. `None` means
    /// either no new data or momentary producer contention; the caller
    /// simply keeps its previous snapshot.
    pub fn take(&self) -> Option<T> {
        match self.slot.try_lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        }
    }
}

/// A `MarketDataFeed` backed by per-instrument slots plus the last
/// drained state. The tick thread sees the newest published book; books
/// already consumed remain current until replaced.
#[derive(Debug, Default)]
pub struct SlotFeed {
    slots: Mutex<BTreeMap<InstrumentId, SnapshotSlot<OrderBookSnapshot>>>,
    current: Mutex<BTreeMap<InstrumentId, OrderBookSnapshot>>,
    funding_rates: Mutex<BTreeMap<InstrumentId, Decimal>>,
}

impl SlotFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer side: publish a fresh snapshot for one instrument.
    pub fn publish_book(&self, instrument: &InstrumentId, book: OrderBookSnapshot) {
        let mut slots = match self.slots.lock() {
            Ok(s) => s,
            Err(_) => return,
        };
        slots
            .entry(instrument.clone())
            .or_insert_with(SnapshotSlot::new)
            .publish(book);
    }

    /// Producer side: update the current funding rate.
    pub fn publish_funding_rate(&self, instrument: &InstrumentId, rate: Decimal) {
        if let Ok(mut rates) = self.funding_rates.lock() {
            rates.insert(instrument.clone(), rate);
        }
    }

    fn drain(&self, instrument: &InstrumentId) {
        let fresh = match self.slots.lock() {
            Ok(slots) => slots.get(instrument).and_then(|s| s.take()),
            Err(_) => None,
        };
        if let Some(book) = fresh {
            if let Ok(mut current) = self.current.lock() {
                current.insert(instrument.clone(), book);
            }
        }
    }
}

impl MarketDataFeed for SlotFeed {
    fn get_book(&self, instrument: &InstrumentId) -> Option<OrderBookSnapshot> {
        self.drain(instrument);
        self.current.lock().ok()?.get(instrument).cloned()
    }

    fn get_mid_price(&self, instrument: &InstrumentId) -> Option<Decimal> {
        self.get_book(instrument).and_then(|b| b.mid_price())
    }

    fn get_funding_rate(&self, instrument: &InstrumentId) -> Decimal {
        self.funding_rates
            .lock()
            .ok()
            .and_then(|rates| rates.get(instrument).copied())
            .unwrap_or(Decimal::ZERO)
    }
}

/// Fixed books and rates; scenario tests script it directly.
#[derive(Debug, Default)]
pub struct StaticFeed {
    books: Mutex<BTreeMap<InstrumentId, OrderBookSnapshot>>,
    funding_rates: Mutex<BTreeMap<InstrumentId, Decimal>>,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_book(&self, instrument: &InstrumentId, book: OrderBookSnapshot) {
        if let Ok(mut books) = self.books.lock() {
            books.insert(instrument.clone(), book);
        }
    }

    pub fn clear_book(&self, instrument: &InstrumentId) {
        if let Ok(mut books) = self.books.lock() {
            books.remove(instrument);
        }
    }

    pub fn set_funding_rate(&self, instrument: &InstrumentId, rate: Decimal) {
        if let Ok(mut rates) = self.funding_rates.lock() {
            rates.insert(instrument.clone(), rate);
        }
    }
}

impl MarketDataFeed for StaticFeed {
    fn get_book(&self, instrument: &InstrumentId) -> Option<OrderBookSnapshot> {
        self.books.lock().ok()?.get(instrument).cloned()
    }

    fn get_mid_price(&self, instrument: &InstrumentId) -> Option<Decimal> {
        self.get_book(instrument).and_then(|b| b.mid_price())
    }

    fn get_funding_rate(&self, instrument: &InstrumentId) -> Decimal {
        self.funding_rates
            .lock()
            .ok()
            .and_then(|rates| rates.get(instrument).copied())
            .unwrap_or(Decimal::ZERO)
    }
}
