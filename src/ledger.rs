//! Multi-asset balance ledger shared by the whole desk
//!
//! One consolidated view of every asset's total and reserved balance.
//! Reserve/release are paired 1:1 per order lifecycle by the engines;
//! the ledger itself enforces the structural invariants: a release can
//! never push `reserved` negative, and `available` is clamped to zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::DeskError;

/// Balance state of a single asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub total: Decimal,
    pub reserved: Decimal,
}

impl AssetBalance {
    pub fn available(&self) -> Decimal {
        (self.total - self.reserved).max(Decimal::ZERO)
    }
}

/// Per-asset available/reserved/total balances for the whole desk.
///
/// Ordered map so iteration, serialization and any derived event
/// ordering is identical across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiAssetLedger {
    balances: BTreeMap<String, AssetBalance>,
}

impl MultiAssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add funds unconditionally (initial capital, realized gains).
    pub fn deposit(&mut self, asset: &str, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        self.entry(asset).total += amount;
    }

    /// Credit an asset (alias of deposit, used in settlement legs).
    pub fn credit(&mut self, asset: &str, amount: Decimal) {
        self.deposit(asset, amount);
    }

    /// Remove funds; errors if the total would go negative.
    pub fn debit(&mut self, asset: &str, amount: Decimal) -> Result<(), DeskError> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }
        let balance = self.entry(asset);
        if balance.total < amount {
            return Err(DeskError::InsufficientFunds {
                asset: asset.to_string(),
                requested: amount,
                available: balance.total,
            });
        }
        balance.total -= amount;
        // A debit consumes reserved funds first when it would otherwise
        // leave reserved above total.
        if balance.reserved > balance.total {
            balance.reserved = balance.total;
        }
        Ok(())
    }

    /// Earmark funds for an accepted order; errors when the request
    /// exceeds the available (unreserved) balance.
    pub fn reserve(&mut self, asset: &str, amount: Decimal) -> Result<(), DeskError> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }
        let balance = self.entry(asset);
        if balance.available() < amount {
            return Err(DeskError::InsufficientFunds {
                asset: asset.to_string(),
                requested: amount,
                available: balance.available(),
            });
        }
        balance.reserved += amount;
        Ok(())
    }

    /// Return an earmark. Clamped at zero: an over-release is a caller
    /// bug, but it must not corrupt the ledger.
    pub fn release(&mut self, asset: &str, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        let balance = self.entry(asset);
        balance.reserved = (balance.reserved - amount).max(Decimal::ZERO);
    }

    pub fn available(&self, asset: &str) -> Decimal {
        self.balances
            .get(asset)
            .map(|b| b.available())
            .unwrap_or(Decimal::ZERO)
    }

    pub fn total(&self, asset: &str) -> Decimal {
        self.balances
            .get(asset)
            .map(|b| b.total)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn reserved(&self, asset: &str) -> Decimal {
        self.balances
            .get(asset)
            .map(|b| b.reserved)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn balances(&self) -> impl Iterator<Item = (&String, &AssetBalance)> {
        self.balances.iter()
    }

    /// Rebuild from persisted totals. Reservations belong to transient
    /// open orders and always restart at zero.
    pub fn restore_totals(&mut self, totals: &BTreeMap<String, Decimal>) {
        self.balances.clear();
        for (asset, total) in totals {
            self.balances.insert(
                asset.clone(),
                AssetBalance {
                    total: *total,
                    reserved: Decimal::ZERO,
                },
            );
        }
    }

    fn entry(&mut self, asset: &str) -> &mut AssetBalance {
        self.balances.entry(asset.to_string()).or_default()
    }
}
