//! Per-instrument position accounting
//!
//! Signed quantity with a volume-weighted average entry price. Realized
//! PnL is price-only; fees and funding accumulate in their own running
//! totals and are never folded in. A fill that both closes and reopens
//! exposure (a flip) is applied atomically.

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{InstrumentId, Side};

/// Result of applying one fill to a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillApplication {
    /// Price-only realized PnL from the closed portion (zero on opens).
    pub realized_delta: Decimal,
    /// Quantity closed against prior exposure, capped at the prior open
    /// size so a flip never double-counts.
    pub closed_quantity: Decimal,
    /// Whether this fill reversed the position's sign.
    pub flipped: bool,
}

/// One position per instrument, owned by the portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperPosition {
    pub instrument: InstrumentId,
    /// Signed: positive long, negative short.
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    /// Pure price PnL from closed exposure.
    pub realized_pnl: Decimal,
    /// Recomputed on every mark-to-market.
    pub unrealized_pnl: Decimal,
    pub total_fees_paid: Decimal,
    /// Net funding paid (negative = received).
    pub funding_paid: Decimal,
    /// Last funding charge timestamp (ms); 0 = never charged.
    pub last_funding_at: i64,
    pub updated_at: i64,
}

impl PaperPosition {
    pub fn new(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            quantity: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            total_fees_paid: Decimal::ZERO,
            funding_paid: Decimal::ZERO,
            last_funding_at: 0,
            updated_at: 0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /// Position notional at `price`.
    pub fn notional(&self, price: Decimal) -> Decimal {
        self.quantity.abs() * price
    }

    /// `realized + unrealized - fees - funding`; the invariant every
    /// settlement must preserve.
    pub fn net_pnl(&self) -> Decimal {
        self.realized_pnl + self.unrealized_pnl - self.total_fees_paid - self.funding_paid
    }

    /// Apply one fill. Opens and adds recompute the VWAP entry; closes
    /// realize price-only PnL on the closed portion; a flip closes the
    /// whole prior exposure and reopens the excess on the other side at
    /// the fill price, in one atomic update.
    pub fn apply_fill(&mut self, side: Side, quantity: Decimal, price: Decimal, now: i64) -> FillApplication {
        let signed = side.sign() * quantity;
        self.updated_at = now;

        // Opening or adding on the same side.
        if self.quantity.is_zero() || self.quantity.signum() == signed.signum() {
            let prior_abs = self.quantity.abs();
            let new_abs = prior_abs + quantity;
            if new_abs > Decimal::ZERO {
                self.avg_entry_price =
                    (prior_abs * self.avg_entry_price + quantity * price) / new_abs;
            }
            self.quantity += signed;
            return FillApplication {
                realized_delta: Decimal::ZERO,
                closed_quantity: Decimal::ZERO,
                flipped: false,
            };
        }

        // Closing against prior exposure; cap at the prior open size.
        let prior_abs = self.quantity.abs();
        let direction = self.quantity.signum();
        let closed = quantity.min(prior_abs);
        let realized = (price - self.avg_entry_price) * closed * direction;
        self.realized_pnl += realized;
        self.quantity += signed;

        let flipped = !self.quantity.is_zero() && self.quantity.signum() != direction;
        if flipped {
            // Excess reopens at the fill price.
            self.avg_entry_price = price;
        } else if self.quantity.is_zero() {
            self.avg_entry_price = Decimal::ZERO;
            self.unrealized_pnl = Decimal::ZERO;
        }

        FillApplication {
            realized_delta: realized,
            closed_quantity: closed,
            flipped,
        }
    }

    pub fn add_fee(&mut self, fee: Decimal) {
        self.total_fees_paid += fee;
    }

    /// Settle one funding charge (positive = paid, negative = received).
    pub fn apply_funding(&mut self, charge: Decimal, now: i64) {
        self.funding_paid += charge;
        self.last_funding_at = now;
    }

    /// Recompute unrealized PnL against a mark price. Signed quantity
    /// makes one formula cover both sides.
    pub fn mark_to_market(&mut self, mark: Decimal) {
        self.unrealized_pnl = if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            (mark - self.avg_entry_price) * self.quantity
        };
    }
}
