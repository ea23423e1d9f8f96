//! Fill models
//!
//! A fill model decides how much of an order executes against the
//! current book snapshot, at what price, and with which liquidity flag.
//! Models own their own seeded generator, so identical seeds and inputs
//! reproduce identical event sequences regardless of what the rest of
//! the process does with randomness.
//!
//! Maker/taker classification derives from order behavior at submission
//! (`crossed_at_creation` / market type), never from comparing the fill
//! price with the touched quote.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{InstrumentId, InstrumentSpec, OrderBookSnapshot, OrderType, PaperOrder, Side};

/// Outcome of evaluating one order against one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FillDecision {
    pub quantity: Decimal,
    pub price: Decimal,
    pub is_maker: bool,
    /// Extra gate before this order may fill again (queue re-entry).
    pub queue_delay_ms: i64,
}

/// Pluggable fill simulation. Mutable receiver: the model owns its RNG.
pub trait FillModel: Send {
    fn evaluate(
        &mut self,
        order: &PaperOrder,
        book: &OrderBookSnapshot,
        now: i64,
    ) -> Option<FillDecision>;
}

/// Configuration for [`QueueFillModel`].
///
/// Deliberately has no `Default`: `fill_probability` and
/// `extra_slip_probability` must be chosen explicitly per desk — the
/// commonly quoted 1.0 / 0.0 are example values, not contractual
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueFillConfig {
    /// Chance a touched resting order fills at all on a given tick.
    pub fill_probability: f64,
    /// Chance a taker fill slips one extra tick beyond the base offset.
    pub extra_slip_probability: f64,
    /// Fraction of visible opposing depth reachable per tick, sampled
    /// uniformly from this band.
    #[serde(default = "default_participation")]
    pub queue_participation: (f64, f64),
    /// Partial-fill ratio band applied to the remaining quantity.
    #[serde(default = "default_partial_fill")]
    pub partial_fill: (f64, f64),
    /// Base taker slippage in basis points of the opposing best.
    #[serde(default)]
    pub slippage_bps: f64,
    /// Adverse-selection offset in basis points, stacked on slippage.
    #[serde(default)]
    pub adverse_selection_bps: f64,
    /// Re-queue gate applied after each maker fill.
    #[serde(default)]
    pub queue_delay_ms: i64,
}

fn default_participation() -> (f64, f64) {
    (0.2, 0.6)
}

fn default_partial_fill() -> (f64, f64) {
    (0.25, 1.0)
}

impl QueueFillConfig {
    pub fn new(fill_probability: f64, extra_slip_probability: f64) -> Self {
        Self {
            fill_probability: fill_probability.clamp(0.0, 1.0),
            extra_slip_probability: extra_slip_probability.clamp(0.0, 1.0),
            queue_participation: default_participation(),
            partial_fill: default_partial_fill(),
            slippage_bps: 0.0,
            adverse_selection_bps: 0.0,
            queue_delay_ms: 0,
        }
    }
}

/// Statistical queue-position model (the desk default).
///
/// Resting orders fill as maker at their own limit price once touched,
/// in randomized partial slices; orders that crossed at submission fill
/// as taker at the opposing best plus a configured slippage/adverse
/// offset.
pub struct QueueFillModel {
    config: QueueFillConfig,
    price_increment: Decimal,
    size_increment: Decimal,
    rng: StdRng,
}

impl QueueFillModel {
    pub fn new(config: QueueFillConfig, spec: &InstrumentSpec, seed: u64) -> Self {
        Self {
            config,
            price_increment: spec.price_increment,
            size_increment: spec.size_increment,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample(&mut self, band: (f64, f64)) -> Decimal {
        let (lo, hi) = band;
        let x = if hi > lo {
            self.rng.gen_range(lo..=hi)
        } else {
            lo
        };
        Decimal::from_f64(x).unwrap_or(Decimal::ONE)
    }

    fn quantize_size(&self, size: Decimal) -> Decimal {
        if self.size_increment <= Decimal::ZERO {
            return size;
        }
        ((size / self.size_increment).floor() * self.size_increment).normalize()
    }

    /// Round a taker fill price against the taker, so slippage is never
    /// rounded away in their favor.
    fn quantize_price_adverse(&self, price: Decimal, side: Side) -> Decimal {
        if self.price_increment <= Decimal::ZERO {
            return price;
        }
        let steps = price / self.price_increment;
        let snapped = match side {
            Side::Buy => steps.ceil(),
            Side::Sell => steps.floor(),
        };
        (snapped * self.price_increment).normalize()
    }

    fn taker_fill(&mut self, order: &PaperOrder, book: &OrderBookSnapshot) -> Option<FillDecision> {
        let best = book.opposing_best(order.side)?.clone();
        let participation = self.sample(self.config.queue_participation);
        let quantity = self.quantize_size(order.remaining_quantity().min(best.size * participation));
        if quantity <= Decimal::ZERO {
            return None;
        }

        let offset_bps = Decimal::from_f64(self.config.slippage_bps + self.config.adverse_selection_bps)
            .unwrap_or(Decimal::ZERO);
        let offset = best.price * offset_bps / Decimal::from(10_000);
        let mut price = match order.side {
            Side::Buy => best.price + offset,
            Side::Sell => best.price - offset,
        };
        if self.config.extra_slip_probability > 0.0
            && self.rng.gen::<f64>() < self.config.extra_slip_probability
        {
            price += order.side.sign() * self.price_increment;
        }
        // A marketable limit never executes beyond its own limit price.
        if let Some(limit) = order.price {
            price = match order.side {
                Side::Buy => price.min(limit),
                Side::Sell => price.max(limit),
            };
        }
        let price = self.quantize_price_adverse(price, order.side);

        Some(FillDecision {
            quantity,
            price,
            is_maker: false,
            queue_delay_ms: 0,
        })
    }

    fn maker_fill(&mut self, order: &PaperOrder, book: &OrderBookSnapshot) -> Option<FillDecision> {
        let limit = order.price?;
        if !book.crosses(order.side, limit) {
            return None;
        }
        // Draw order is fixed: miss gate, participation, partial ratio.
        if self.rng.gen::<f64>() >= self.config.fill_probability {
            return None;
        }
        let best = book.opposing_best(order.side)?.clone();
        let participation = self.sample(self.config.queue_participation);
        let partial = self.sample(self.config.partial_fill);
        let remaining = order.remaining_quantity();
        let quantity = self.quantize_size(
            remaining
                .min(best.size * participation)
                .min(remaining * partial),
        );
        if quantity <= Decimal::ZERO {
            return None;
        }

        Some(FillDecision {
            quantity,
            price: limit,
            is_maker: true,
            queue_delay_ms: self.config.queue_delay_ms,
        })
    }
}

impl FillModel for QueueFillModel {
    fn evaluate(
        &mut self,
        order: &PaperOrder,
        book: &OrderBookSnapshot,
        _now: i64,
    ) -> Option<FillDecision> {
        if order.order_type == OrderType::Market || order.crossed_at_creation {
            self.taker_fill(order, book)
        } else {
            self.maker_fill(order, book)
        }
    }
}

/// Fills the whole remaining quantity in one shot: takers at the
/// opposing best, resting orders at their limit once touched. No
/// randomness; handy for smoke scenarios where fill texture is noise.
pub struct ImmediateFillModel {
    size_increment: Decimal,
}

impl ImmediateFillModel {
    pub fn new(spec: &InstrumentSpec) -> Self {
        Self {
            size_increment: spec.size_increment,
        }
    }
}

impl FillModel for ImmediateFillModel {
    fn evaluate(
        &mut self,
        order: &PaperOrder,
        book: &OrderBookSnapshot,
        _now: i64,
    ) -> Option<FillDecision> {
        let taker = order.order_type == OrderType::Market || order.crossed_at_creation;
        let best = book.opposing_best(order.side)?;
        let price = if taker {
            best.price
        } else {
            let limit = order.price?;
            if !book.crosses(order.side, limit) {
                return None;
            }
            limit
        };
        let mut quantity = order.remaining_quantity().min(best.size);
        if self.size_increment > Decimal::ZERO {
            quantity = ((quantity / self.size_increment).floor() * self.size_increment).normalize();
        }
        if quantity <= Decimal::ZERO {
            return None;
        }
        Some(FillDecision {
            quantity,
            price,
            is_maker: !taker,
            queue_delay_ms: 0,
        })
    }
}

/// Deterministic per-instrument seed derived from the desk master seed.
///
/// FNV-1a over the instrument's display form, folded with the master
/// seed; stable across runs and platforms.
pub fn derive_seed(master_seed: u64, instrument: &InstrumentId) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in instrument.to_string().as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash ^ master_seed
}
