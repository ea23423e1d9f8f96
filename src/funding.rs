//! Funding simulator for perpetual positions
//!
//! Periodically exchanges funding between long and short perpetual
//! holders from an externally supplied rate. Runs once per desk tick,
//! independent of per-instrument matching. Spot instruments and flat
//! positions are skipped.

use rust_decimal::Decimal;
use tracing::debug;

use crate::portfolio::PaperPortfolio;
use crate::types::{InstrumentSpec, InstrumentType};

/// One settled funding charge, for `FundingApplied` emission.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingOutcome {
    pub funding_rate: Decimal,
    /// Signed quote amount: positive = the position paid.
    pub charge: Decimal,
    pub position_quantity: Decimal,
}

/// Stateless over instruments: the last-charge timestamp lives on the
/// position itself, so it persists and restores with portfolio state.
#[derive(Debug, Default)]
pub struct FundingSimulator;

impl FundingSimulator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one instrument. Returns a settled charge when the
    /// funding interval has elapsed, `None` otherwise.
    ///
    /// The first eligible tick of a fresh position anchors its funding
    /// clock without charging; charges start one full interval later.
    pub fn tick_instrument(
        &mut self,
        spec: &InstrumentSpec,
        funding_rate: Decimal,
        mark: Decimal,
        portfolio: &mut PaperPortfolio,
        now: i64,
    ) -> Option<FundingOutcome> {
        if spec.id.instrument_type != InstrumentType::Perp || spec.funding_interval_ms <= 0 {
            return None;
        }
        let quote = spec.id.quote_asset().to_string();

        let position = portfolio.position(&spec.id)?;
        if position.is_flat() {
            return None;
        }
        if position.last_funding_at == 0 {
            // 0 is the never-charged sentinel, so an anchor at t=0 must
            // not be confused with it.
            portfolio.position_mut(&spec.id).last_funding_at = now.max(1);
            return None;
        }
        if now - position.last_funding_at < spec.funding_interval_ms {
            return None;
        }
        if mark <= Decimal::ZERO {
            debug!(instrument = %spec.id, "[FUNDING] No usable mark price, skipping charge");
            return None;
        }

        // Signed quantity gives the sign convention directly: longs pay
        // a positive rate, shorts receive it; reversed for negative rates.
        let quantity = position.quantity;
        let charge = funding_rate * quantity * mark;

        if charge > Decimal::ZERO {
            portfolio.settle_funding_debit(&quote, charge);
        } else if charge < Decimal::ZERO {
            portfolio.ledger_mut().credit(&quote, -charge);
        }
        portfolio.position_mut(&spec.id).apply_funding(charge, now);

        Some(FundingOutcome {
            funding_rate,
            charge,
            position_quantity: quantity,
        })
    }
}
