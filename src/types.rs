//! Core domain types for the paper desk
//!
//! Instrument identity and exchange specification, order and book
//! snapshot records shared by every engine. Everything monetary is a
//! `Decimal`; quantization and limit validation live on the spec so the
//! rules travel with the instrument.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RejectReason;

/// Instrument class traded on the desk
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentType {
    #[default]
    Spot,
    Perp,
    Future,
}

impl InstrumentType {
    /// Leveraged instruments carry margin parameters and funding.
    pub fn is_leveraged(&self) -> bool {
        matches!(self, InstrumentType::Perp | InstrumentType::Future)
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "spot" => Some(InstrumentType::Spot),
            "perp" | "perpetual" => Some(InstrumentType::Perp),
            "future" | "futures" => Some(InstrumentType::Future),
            _ => None,
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentType::Spot => write!(f, "spot"),
            InstrumentType::Perp => write!(f, "perp"),
            InstrumentType::Future => write!(f, "future"),
        }
    }
}

/// Immutable identity key: venue + trading pair + instrument type.
///
/// The pair is `BASE/QUOTE` (e.g. `"BTC/USDT"`); base and quote asset
/// symbols are derived from it for ledger settlement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentId {
    pub venue: String,
    pub pair: String,
    pub instrument_type: InstrumentType,
}

impl InstrumentId {
    pub fn new(venue: impl Into<String>, pair: impl Into<String>, itype: InstrumentType) -> Self {
        Self {
            venue: venue.into(),
            pair: pair.into(),
            instrument_type: itype,
        }
    }

    pub fn spot(venue: impl Into<String>, pair: impl Into<String>) -> Self {
        Self::new(venue, pair, InstrumentType::Spot)
    }

    pub fn perp(venue: impl Into<String>, pair: impl Into<String>) -> Self {
        Self::new(venue, pair, InstrumentType::Perp)
    }

    /// Base asset symbol (left of the `/`); the whole pair if malformed.
    pub fn base_asset(&self) -> &str {
        self.pair.split('/').next().unwrap_or(&self.pair)
    }

    /// Quote asset symbol (right of the `/`); the whole pair if malformed.
    pub fn quote_asset(&self) -> &str {
        self.pair.split('/').nth(1).unwrap_or(&self.pair)
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.venue, self.pair, self.instrument_type)
    }
}

/// Order side (buy/sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Buy,
    Sell,
}

impl Side {
    /// Direction sign for position arithmetic: buy = +1, sell = -1.
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => -Decimal::ONE,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    #[default]
    Limit,
    /// Post-only: rejected (configurable) if it would cross at submission.
    LimitMaker,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::LimitMaker => write!(f, "LIMIT_MAKER"),
        }
    }
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted, parked in the inflight latency queue.
    #[default]
    PendingNew,
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::PendingNew => write!(f, "PENDING_NEW"),
            OrderStatus::Open => write!(f, "OPEN"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Canceled => write!(f, "CANCELED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Order identifier assigned by the desk from a monotonic sequence.
///
/// Sequential rather than random so that identical submission sequences
/// produce identical ids and therefore identical event logs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exchange precision/limits plus default fee rates for one instrument.
///
/// Margin fields only apply to leveraged instruments; they are ignored
/// for spot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub id: InstrumentId,
    /// Price tick
    pub price_increment: Decimal,
    /// Size lot
    pub size_increment: Decimal,
    pub min_quantity: Decimal,
    pub max_quantity: Decimal,
    pub min_notional: Decimal,
    /// Default maker fee rate (fraction of notional)
    pub maker_fee_rate: Decimal,
    /// Default taker fee rate (fraction of notional)
    pub taker_fee_rate: Decimal,
    /// Initial-margin ratio (perp only)
    #[serde(default)]
    pub margin_init_ratio: Decimal,
    /// Maintenance-margin ratio (perp only); crossing it logs a warning
    #[serde(default)]
    pub margin_maint_ratio: Decimal,
    /// Maximum leverage (perp only)
    #[serde(default)]
    pub max_leverage: Decimal,
    /// Funding interval in milliseconds (perp only; 0 = no funding)
    #[serde(default)]
    pub funding_interval_ms: i64,
}

impl InstrumentSpec {
    /// Snap a price to the tick grid. Buy prices round down, sell
    /// prices round up, so quantization never improves an order's
    /// priority against the book.
    pub fn quantize_price(&self, price: Decimal, side: Side) -> Decimal {
        match side {
            Side::Buy => snap_down(price, self.price_increment),
            Side::Sell => snap_up(price, self.price_increment),
        }
    }

    /// Snap a size to the lot grid. Sizes always round down.
    pub fn quantize_size(&self, size: Decimal) -> Decimal {
        snap_down(size, self.size_increment)
    }

    /// Validate an already-quantized price/quantity against spec limits.
    pub fn validate(&self, price: Option<Decimal>, quantity: Decimal) -> Result<(), RejectReason> {
        if let Some(p) = price {
            if p <= Decimal::ZERO {
                return Err(RejectReason::InvalidPrice);
            }
        }
        if quantity <= Decimal::ZERO {
            return Err(RejectReason::InvalidQuantity);
        }
        if quantity < self.min_quantity {
            return Err(RejectReason::BelowMinQuantity);
        }
        if self.max_quantity > Decimal::ZERO && quantity > self.max_quantity {
            return Err(RejectReason::AboveMaxQuantity);
        }
        if let Some(p) = price {
            if self.min_notional > Decimal::ZERO && p * quantity < self.min_notional {
                return Err(RejectReason::BelowMinNotional);
            }
        }
        Ok(())
    }

    /// Quote-asset reservation required to open a leveraged order:
    /// `notional / max_leverage * margin_init_ratio`.
    pub fn initial_margin(&self, notional: Decimal) -> Decimal {
        if self.max_leverage <= Decimal::ZERO {
            return notional;
        }
        notional / self.max_leverage * self.margin_init_ratio
    }
}

/// Snap down to the nearest multiple of `increment` (no-op for zero increment).
fn snap_down(value: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return value.normalize();
    }
    ((value / increment).floor() * increment).normalize()
}

/// Snap up to the nearest multiple of `increment`.
fn snap_up(value: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return value.normalize();
    }
    ((value / increment).ceil() * increment).normalize()
}

/// One price level of a book snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl BookLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Immutable order-book snapshot: best-first bid/ask levels + timestamp.
///
/// Engines hold at most one snapshot at a time; a newer snapshot
/// replaces the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    /// Snapshot timestamp in milliseconds
    pub timestamp: i64,
}

impl OrderBookSnapshot {
    /// Build a snapshot from raw levels:
    /// - keep only positive price/size
    /// - sort bids descending (best first)
    /// - sort asks ascending (best first)
    pub fn normalize(mut bids: Vec<BookLevel>, mut asks: Vec<BookLevel>, timestamp: i64) -> Self {
        bids.retain(|l| l.price > Decimal::ZERO && l.size > Decimal::ZERO);
        asks.retain(|l| l.price > Decimal::ZERO && l.size > Decimal::ZERO);
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self {
            bids,
            asks,
            timestamp,
        }
    }

    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Best level on the side an incoming order would trade against.
    pub fn opposing_best(&self, side: Side) -> Option<&BookLevel> {
        match side {
            Side::Buy => self.best_ask(),
            Side::Sell => self.best_bid(),
        }
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Whether a limit price on `side` touches or crosses the opposing best.
    pub fn crosses(&self, side: Side, price: Decimal) -> bool {
        match side {
            Side::Buy => self.best_ask().map(|a| price >= a.price).unwrap_or(false),
            Side::Sell => self.best_bid().map(|b| price <= b.price).unwrap_or(false),
        }
    }
}

/// Mutable order record, owned by exactly one matching engine.
///
/// `crossed_at_creation` is fixed at submission and permanently
/// determines maker/taker eligibility for every fill of this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperOrder {
    pub id: OrderId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub order_type: OrderType,
    /// Quantized limit price; `None` for market orders
    pub price: Option<Decimal>,
    /// Quantized order quantity (base asset)
    pub quantity: Decimal,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub filled_notional: Decimal,
    pub fee_paid: Decimal,
    pub fill_count: u32,
    pub crossed_at_creation: bool,
    /// Ledger asset reserved for this order
    pub reserve_asset: String,
    /// Reservation not yet released back to the ledger
    pub reserved_remaining: Decimal,
    /// Total reserved at acceptance (release pairing audit)
    pub reserved_total: Decimal,
    pub created_at: i64,
    pub last_fill_at: i64,
    /// No further fills before this instant (inter-fill latency plus
    /// any queue re-entry delay from the fill model)
    #[serde(default)]
    pub next_fill_after: i64,
    /// Set when the order reaches a terminal status (drives pruning)
    pub terminal_at: Option<i64>,
}

impl PaperOrder {
    pub fn remaining_quantity(&self) -> Decimal {
        (self.quantity - self.filled_quantity).max(Decimal::ZERO)
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::PendingNew | OrderStatus::Open | OrderStatus::PartiallyFilled
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn avg_fill_price(&self) -> Option<Decimal> {
        if self.filled_quantity > Decimal::ZERO {
            Some(self.filled_notional / self.filled_quantity)
        } else {
            None
        }
    }

    /// Record one fill against cumulative state.
    pub fn record_fill(&mut self, quantity: Decimal, price: Decimal, fee: Decimal, now: i64) {
        self.filled_quantity += quantity;
        self.filled_notional += quantity * price;
        self.fee_paid += fee;
        self.fill_count += 1;
        self.last_fill_at = now;
    }
}
