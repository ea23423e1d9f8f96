//! Shared portfolio: ledger, positions, risk guard
//!
//! One `PaperPortfolio` spans every instrument and strategy on the
//! desk — a single consolidated risk view, the way a real margin
//! account behaves. Engines settle fills here; the funding simulator
//! charges margin here; the risk guard vetoes acceptances here.
//!
//! `settle_fill` commits ledger and position mutations before its
//! outcome (used to build the emitted event) is constructed, so an
//! event can never describe uncommitted state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::RejectReason;
use crate::ledger::MultiAssetLedger;
use crate::position::PaperPosition;
use crate::types::{InstrumentId, InstrumentSpec, InstrumentType, Side};

/// Risk limits evaluated before every order acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskGuardConfig {
    /// Per-instrument position notional cap; zero disables the check.
    pub max_position_notional: Decimal,
    /// Hard drawdown stop as a fraction of peak equity (e.g. 0.25);
    /// zero disables the check.
    pub max_drawdown: Decimal,
}

impl Default for RiskGuardConfig {
    fn default() -> Self {
        Self {
            max_position_notional: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
        }
    }
}

/// Everything an engine needs to emit `PositionChanged` after a fill,
/// captured strictly after the books are committed.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub realized_delta: Decimal,
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub realized_pnl_total: Decimal,
    pub total_fees_paid: Decimal,
    pub funding_paid: Decimal,
}

/// Shared ledger + position map + risk guard for the whole desk.
#[derive(Debug)]
pub struct PaperPortfolio {
    ledger: MultiAssetLedger,
    positions: BTreeMap<InstrumentId, PaperPosition>,
    /// Asset equity and drawdown are measured in.
    valuation_asset: String,
    risk: RiskGuardConfig,
    /// Last mid per instrument, kept for equity valuation.
    marks: BTreeMap<InstrumentId, Decimal>,
    peak_equity: Decimal,
    last_equity: Decimal,
}

impl PaperPortfolio {
    pub fn new(valuation_asset: impl Into<String>, risk: RiskGuardConfig) -> Self {
        Self {
            ledger: MultiAssetLedger::new(),
            positions: BTreeMap::new(),
            valuation_asset: valuation_asset.into(),
            risk,
            marks: BTreeMap::new(),
            peak_equity: Decimal::ZERO,
            last_equity: Decimal::ZERO,
        }
    }

    pub fn deposit(&mut self, asset: &str, amount: Decimal) {
        self.ledger.deposit(asset, amount);
        // Seed the drawdown baseline from funded capital.
        let equity = self.equity();
        self.peak_equity = self.peak_equity.max(equity);
        self.last_equity = equity;
    }

    pub fn ledger(&self) -> &MultiAssetLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut MultiAssetLedger {
        &mut self.ledger
    }

    pub fn position(&self, instrument: &InstrumentId) -> Option<&PaperPosition> {
        self.positions.get(instrument)
    }

    pub fn positions(&self) -> impl Iterator<Item = (&InstrumentId, &PaperPosition)> {
        self.positions.iter()
    }

    pub fn position_mut(&mut self, instrument: &InstrumentId) -> &mut PaperPosition {
        self.positions
            .entry(instrument.clone())
            .or_insert_with(|| PaperPosition::new(instrument.clone()))
    }

    pub fn valuation_asset(&self) -> &str {
        &self.valuation_asset
    }

    pub fn last_equity(&self) -> Decimal {
        self.last_equity
    }

    pub fn peak_equity(&self) -> Decimal {
        self.peak_equity
    }

    /// Settle one fill: position first, then the ledger legs, then the
    /// outcome snapshot for event emission.
    pub fn settle_fill(
        &mut self,
        spec: &InstrumentSpec,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
        now: i64,
    ) -> SettlementOutcome {
        let notional = quantity * price;
        let quote = spec.id.quote_asset().to_string();
        let base = spec.id.base_asset().to_string();

        let position = self
            .positions
            .entry(spec.id.clone())
            .or_insert_with(|| PaperPosition::new(spec.id.clone()));
        let application = position.apply_fill(side, quantity, price, now);
        position.add_fee(fee);

        match spec.id.instrument_type {
            InstrumentType::Spot => match side {
                Side::Buy => {
                    self.debit_saturating(&quote, notional + fee);
                    self.ledger.credit(&base, quantity);
                }
                Side::Sell => {
                    self.debit_saturating(&base, quantity);
                    self.ledger.credit(&quote, notional);
                    self.debit_saturating(&quote, fee);
                }
            },
            // Leveraged: fee always settles in quote; closes move only
            // the realized-PnL amount, never the full notional.
            InstrumentType::Perp | InstrumentType::Future => {
                self.debit_saturating(&quote, fee);
                if application.realized_delta > Decimal::ZERO {
                    self.ledger.credit(&quote, application.realized_delta);
                } else if application.realized_delta < Decimal::ZERO {
                    self.debit_saturating(&quote, -application.realized_delta);
                }
            }
        }

        let position = &self.positions[&spec.id];
        SettlementOutcome {
            realized_delta: application.realized_delta,
            quantity: position.quantity,
            avg_entry_price: position.avg_entry_price,
            realized_pnl_total: position.realized_pnl,
            total_fees_paid: position.total_fees_paid,
            funding_paid: position.funding_paid,
        }
    }

    /// Risk guard: per-instrument projected-notional cap and the
    /// portfolio hard-drawdown stop. Evaluated before every acceptance.
    pub fn check_order(
        &self,
        spec: &InstrumentSpec,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<(), RejectReason> {
        if self.risk.max_position_notional > Decimal::ZERO {
            let current = self
                .positions
                .get(&spec.id)
                .map(|p| p.quantity)
                .unwrap_or(Decimal::ZERO);
            let projected = (current + side.sign() * quantity).abs() * price;
            if projected > self.risk.max_position_notional {
                return Err(RejectReason::RiskPositionCap);
            }
        }

        if self.risk.max_drawdown > Decimal::ZERO && self.peak_equity > Decimal::ZERO {
            let drawdown = (self.peak_equity - self.last_equity) / self.peak_equity;
            if drawdown > self.risk.max_drawdown {
                return Err(RejectReason::RiskDrawdownStop);
            }
        }

        Ok(())
    }

    /// Recompute every position's unrealized PnL against the supplied
    /// mids, refresh equity/peak, and warn once per call when leveraged
    /// exposure breaches its maintenance threshold (warn only — there
    /// is no liquidation engine here).
    pub fn mark_to_market(&mut self, marks: &BTreeMap<InstrumentId, Decimal>, specs: &BTreeMap<InstrumentId, InstrumentSpec>) {
        for (instrument, mark) in marks {
            self.marks.insert(instrument.clone(), *mark);
            if let Some(position) = self.positions.get_mut(instrument) {
                position.mark_to_market(*mark);
            }
        }

        let equity = self.equity();
        self.last_equity = equity;
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }

        let mut maint_required = Decimal::ZERO;
        for (instrument, position) in &self.positions {
            if !instrument.instrument_type.is_leveraged() || position.is_flat() {
                continue;
            }
            if let (Some(spec), Some(mark)) = (specs.get(instrument), self.marks.get(instrument)) {
                maint_required += position.notional(*mark) * spec.margin_maint_ratio;
            }
        }
        if maint_required > Decimal::ZERO && equity < maint_required {
            warn!(
                equity = %equity,
                maintenance_required = %maint_required,
                "[PORTFOLIO] Equity below maintenance margin threshold"
            );
        }
    }

    /// Desk equity in the valuation asset: quote totals, plus spot base
    /// holdings at their last mark, plus leveraged unrealized PnL.
    pub fn equity(&self) -> Decimal {
        let mut equity = self.ledger.total(&self.valuation_asset);

        for (asset, balance) in self.ledger.balances() {
            if asset == &self.valuation_asset || balance.total.is_zero() {
                continue;
            }
            if let Some(mark) = self.spot_mark_for_asset(asset) {
                equity += balance.total * mark;
            } else {
                debug!(asset = %asset, "[PORTFOLIO] No mark for asset, valued at zero");
            }
        }

        for (instrument, position) in &self.positions {
            if instrument.instrument_type.is_leveraged() {
                equity += position.unrealized_pnl;
            }
        }

        equity
    }

    fn spot_mark_for_asset(&self, asset: &str) -> Option<Decimal> {
        self.marks
            .iter()
            .find(|(id, _)| {
                id.instrument_type == InstrumentType::Spot && id.base_asset() == asset
            })
            .map(|(_, mark)| *mark)
    }

    /// Funding settlement leg: debit the quote margin balance, clamped
    /// the same way fill settlement is.
    pub fn settle_funding_debit(&mut self, asset: &str, amount: Decimal) {
        self.debit_saturating(asset, amount);
    }

    /// Debit that can never corrupt the ledger mid-settlement: clamps
    /// to the remaining total and warns, instead of leaving a
    /// half-applied fill.
    fn debit_saturating(&mut self, asset: &str, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        let total = self.ledger.total(asset);
        let applied = amount.min(total);
        if applied < amount {
            warn!(
                asset = %asset,
                requested = %amount,
                applied = %applied,
                "[PORTFOLIO] Settlement debit clamped to remaining balance"
            );
        }
        if applied > Decimal::ZERO {
            // Cannot fail: applied <= total.
            let _ = self.ledger.debit(asset, applied);
        }
    }

    // ── Persistence hooks ───────────────────────────────────────────

    /// Balance totals for the state snapshot (reservations excluded —
    /// they belong to transient open orders).
    pub fn export_balances(&self) -> BTreeMap<String, Decimal> {
        self.ledger
            .balances()
            .map(|(asset, b)| (asset.clone(), b.total))
            .collect()
    }

    /// Non-flat positions for the state snapshot.
    pub fn export_positions(&self) -> Vec<PaperPosition> {
        self.positions
            .values()
            .filter(|p| !p.is_flat())
            .cloned()
            .collect()
    }

    /// Restore from a persisted snapshot: totals, positions, and a
    /// fresh drawdown baseline. Open orders never survive a restart, so
    /// reservations restart at zero.
    pub fn restore(&mut self, balances: &BTreeMap<String, Decimal>, positions: Vec<PaperPosition>) {
        self.ledger.restore_totals(balances);
        self.positions.clear();
        for position in positions {
            self.positions.insert(position.instrument.clone(), position);
        }
        let equity = self.equity();
        self.peak_equity = equity;
        self.last_equity = equity;
    }
}
