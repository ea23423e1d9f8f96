//! Typed desk events
//!
//! The only externally observable channel of the simulation. Events are
//! immutable, carry a desk-assigned sequence number plus timestamp and
//! instrument, and serialize every decimal as an exact-precision string
//! (no floating point anywhere on the wire).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::{InstrumentId, OrderId, OrderStatus, OrderType, Side};

/// Everything the desk reports to the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeskEvent {
    OrderAccepted {
        seq: u64,
        timestamp: i64,
        instrument: InstrumentId,
        order_id: OrderId,
        side: Side,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
        crossed_at_creation: bool,
        /// Quote (or base, for spot sells) amount reserved in the ledger
        reserved: Decimal,
        reserve_asset: String,
    },
    OrderRejected {
        seq: u64,
        timestamp: i64,
        instrument: InstrumentId,
        /// Desk id when one was assigned before rejection
        order_id: Option<OrderId>,
        side: Side,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
        /// Machine-readable reason token
        reason: String,
    },
    OrderFilled {
        seq: u64,
        timestamp: i64,
        instrument: InstrumentId,
        order_id: OrderId,
        side: Side,
        fill_quantity: Decimal,
        fill_price: Decimal,
        fee: Decimal,
        is_maker: bool,
        cumulative_quantity: Decimal,
        remaining_quantity: Decimal,
        status: OrderStatus,
    },
    OrderCanceled {
        seq: u64,
        timestamp: i64,
        instrument: InstrumentId,
        order_id: OrderId,
        /// Unfilled quantity at cancellation
        remaining_quantity: Decimal,
        /// Reservation released back to the ledger
        released: Decimal,
    },
    PositionChanged {
        seq: u64,
        timestamp: i64,
        instrument: InstrumentId,
        /// Signed position quantity after this change
        quantity: Decimal,
        avg_entry_price: Decimal,
        /// Realized PnL delta from this fill only (price PnL, fee excluded)
        realized_pnl_delta: Decimal,
        realized_pnl_total: Decimal,
        total_fees_paid: Decimal,
        funding_paid: Decimal,
    },
    FundingApplied {
        seq: u64,
        timestamp: i64,
        instrument: InstrumentId,
        funding_rate: Decimal,
        /// Signed amount settled against quote margin: positive = paid
        charge: Decimal,
        position_quantity: Decimal,
    },
    EngineError {
        seq: u64,
        timestamp: i64,
        instrument: InstrumentId,
        detail: String,
    },
}

impl DeskEvent {
    pub fn seq(&self) -> u64 {
        match self {
            DeskEvent::OrderAccepted { seq, .. }
            | DeskEvent::OrderRejected { seq, .. }
            | DeskEvent::OrderFilled { seq, .. }
            | DeskEvent::OrderCanceled { seq, .. }
            | DeskEvent::PositionChanged { seq, .. }
            | DeskEvent::FundingApplied { seq, .. }
            | DeskEvent::EngineError { seq, .. } => *seq,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            DeskEvent::OrderAccepted { timestamp, .. }
            | DeskEvent::OrderRejected { timestamp, .. }
            | DeskEvent::OrderFilled { timestamp, .. }
            | DeskEvent::OrderCanceled { timestamp, .. }
            | DeskEvent::PositionChanged { timestamp, .. }
            | DeskEvent::FundingApplied { timestamp, .. }
            | DeskEvent::EngineError { timestamp, .. } => *timestamp,
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        match self {
            DeskEvent::OrderAccepted { instrument, .. }
            | DeskEvent::OrderRejected { instrument, .. }
            | DeskEvent::OrderFilled { instrument, .. }
            | DeskEvent::OrderCanceled { instrument, .. }
            | DeskEvent::PositionChanged { instrument, .. }
            | DeskEvent::FundingApplied { instrument, .. }
            | DeskEvent::EngineError { instrument, .. } => instrument,
        }
    }
}

/// Monotonic event-sequence allocator owned by the desk and threaded
/// through every engine call, so a single ordering spans all
/// instruments.
#[derive(Debug, Default)]
pub struct Sequencer {
    next: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        let seq = self.next;
        self.next += 1;
        seq
    }
}

/// Bounded in-memory event log kept by the desk for inspection and
/// deterministic-replay assertions. Oldest events fall off the front.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<DeskEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, event: DeskEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeskEvent> {
        self.events.iter()
    }

    /// Serialize the whole log as JSON lines, for byte-level replay
    /// comparison in tests.
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}
