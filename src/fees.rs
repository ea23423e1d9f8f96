//! Fee models
//!
//! Fees are a pure function of notional and the maker/taker flag, and
//! are always tracked separately from realized PnL — never folded into
//! a fill decision or a PnL figure.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::DeskError;
use crate::types::InstrumentSpec;

/// Pure fee computation over one fill's notional.
pub trait FeeModel: Send {
    fn compute(&self, notional: Decimal, is_maker: bool) -> Decimal;
}

/// Flat maker/taker rates taken from the instrument spec.
#[derive(Debug, Clone)]
pub struct FlatRateFees {
    maker_rate: Decimal,
    taker_rate: Decimal,
}

impl FlatRateFees {
    pub fn new(maker_rate: Decimal, taker_rate: Decimal) -> Self {
        Self {
            maker_rate,
            taker_rate,
        }
    }

    pub fn from_spec(spec: &InstrumentSpec) -> Self {
        Self::new(spec.maker_fee_rate, spec.taker_fee_rate)
    }
}

impl FeeModel for FlatRateFees {
    fn compute(&self, notional: Decimal, is_maker: bool) -> Decimal {
        let rate = if is_maker {
            self.maker_rate
        } else {
            self.taker_rate
        };
        notional.abs() * rate
    }
}

/// Maker/taker rate pair for one venue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VenueRates {
    pub maker: Decimal,
    pub taker: Decimal,
}

/// External rate table: profile name -> venue -> rates.
///
/// Loaded once and held immutable per model instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeProfileTable {
    profiles: BTreeMap<String, BTreeMap<String, VenueRates>>,
}

impl FeeProfileTable {
    pub fn from_yaml_str(s: &str) -> Result<Self, DeskError> {
        serde_yaml::from_str(s).map_err(|e| DeskError::Config(format!("fee profile table: {e}")))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, DeskError> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn rates(&self, profile: &str, venue: &str) -> Option<VenueRates> {
        self.profiles.get(profile)?.get(venue).copied()
    }
}

/// Tiered fees resolved from a profile table at construction time.
#[derive(Debug, Clone)]
pub struct TieredFees {
    rates: VenueRates,
}

impl TieredFees {
    /// Resolve rates for `venue` under `profile`; fails fast instead of
    /// silently trading at the wrong tier.
    pub fn new(table: &FeeProfileTable, profile: &str, venue: &str) -> Result<Self, DeskError> {
        let rates = table.rates(profile, venue).ok_or_else(|| {
            DeskError::Config(format!("no fee rates for venue {venue} in profile {profile}"))
        })?;
        Ok(Self { rates })
    }
}

impl FeeModel for TieredFees {
    fn compute(&self, notional: Decimal, is_maker: bool) -> Decimal {
        let rate = if is_maker {
            self.rates.maker
        } else {
            self.rates.taker
        };
        notional.abs() * rate
    }
}

/// Constant fee per fill, regardless of notional or liquidity flag.
#[derive(Debug, Clone)]
pub struct FixedCommission {
    per_fill: Decimal,
}

impl FixedCommission {
    pub fn new(per_fill: Decimal) -> Self {
        Self { per_fill }
    }
}

impl FeeModel for FixedCommission {
    fn compute(&self, _notional: Decimal, _is_maker: bool) -> Decimal {
        self.per_fill
    }
}
