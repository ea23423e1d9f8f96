//! Desk state persistence
//!
//! Snapshot/restore of portfolio state only: asset balance totals,
//! non-flat positions, and last-funding timestamps (which ride on the
//! positions). Order books and open orders are transient and never
//! persisted — a restart always starts flat on live orders.
//!
//! Writes are throttled (default at most once per 30s) and force-flushed
//! on shutdown.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::position::PaperPosition;
use crate::portfolio::PaperPortfolio;

/// The persisted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskStateSnapshot {
    /// Schema version for forward migrations.
    pub version: u32,
    pub saved_at: i64,
    /// Asset balance totals. Reservations belong to open orders and are
    /// intentionally absent.
    pub balances: BTreeMap<String, Decimal>,
    /// Every non-flat position, including its last-funding timestamp.
    pub positions: Vec<PaperPosition>,
}

impl DeskStateSnapshot {
    pub const VERSION: u32 = 1;

    pub fn capture(portfolio: &PaperPortfolio, now: i64) -> Self {
        Self {
            version: Self::VERSION,
            saved_at: now,
            balances: portfolio.export_balances(),
            positions: portfolio.export_positions(),
        }
    }

    pub fn apply(self, portfolio: &mut PaperPortfolio) {
        portfolio.restore(&self.balances, self.positions);
    }
}

/// Throttled JSON file store for [`DeskStateSnapshot`].
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    /// Minimum interval between unforced writes.
    min_interval_ms: i64,
    last_saved_at: i64,
}

impl StateStore {
    pub const DEFAULT_MIN_INTERVAL_MS: i64 = 30_000;

    pub fn new(path: PathBuf, min_interval_ms: i64) -> Self {
        Self {
            path,
            min_interval_ms: min_interval_ms.max(0),
            last_saved_at: 0,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Persist if the throttle window has passed, or unconditionally
    /// when `force` is set (shutdown). Returns whether a write happened.
    pub fn save(&mut self, snapshot: &DeskStateSnapshot, now: i64, force: bool) -> Result<bool> {
        if !force && self.last_saved_at > 0 && now - self.last_saved_at < self.min_interval_ms {
            return Ok(false);
        }
        let json = serde_json::to_string_pretty(snapshot)
            .context("Failed to serialize desk state")?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        self.last_saved_at = now;
        info!(
            path = %self.path.display(),
            positions = snapshot.positions.len(),
            forced = force,
            "[STATE] Desk state saved"
        );
        Ok(true)
    }

    /// Load a previously saved snapshot; `Ok(None)` when no file exists.
    pub fn load(&self) -> Result<Option<DeskStateSnapshot>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "[STATE] No state file found, starting fresh");
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let snapshot: DeskStateSnapshot =
            serde_json::from_str(&json).context("Failed to parse desk state")?;
        info!(
            path = %self.path.display(),
            saved_at = snapshot.saved_at,
            positions = snapshot.positions.len(),
            "[STATE] Desk state loaded"
        );
        Ok(Some(snapshot))
    }
}
