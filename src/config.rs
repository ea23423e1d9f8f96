//! Configuration management for the paper desk
//!
//! Loads from layered config files + environment variables. Baseline
//! defaults are set programmatically; `config/default` and
//! `config/local` files override them, and `PAPERDESK_*` environment
//! variables override everything.
//!
//! The two fill-simulation probabilities have **no defaults** on
//! purpose: a desk must choose them explicitly before certifying
//! anything from simulated fills.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::engine::EngineConfig;
use crate::error::DeskError;
use crate::fill::QueueFillConfig;
use crate::latency::LatencyModel;
use crate::portfolio::RiskGuardConfig;
use crate::types::{InstrumentId, InstrumentSpec, InstrumentType};

/// Top-level desk configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeskConfig {
    pub desk: DeskSection,
    pub ledger: LedgerSection,
    pub risk: RiskGuardConfig,
    pub persistence: PersistenceSection,
    pub engine: EngineConfig,
    pub latency: LatencyModel,
    pub fill: QueueFillConfig,
    /// Instruments to register at startup.
    #[serde(default)]
    pub instruments: Vec<InstrumentCfg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeskSection {
    /// Master seed for all fill-model generators.
    pub seed: u64,
    /// Asset equity and drawdown are measured in.
    pub valuation_asset: String,
    /// Bounded in-memory event log size.
    pub event_log_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSection {
    /// Initial deposits per asset.
    #[serde(default)]
    pub deposits: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSection {
    /// Desk state snapshot file.
    pub state_file: String,
    /// Minimum interval between unforced snapshot writes.
    pub min_interval_ms: i64,
}

/// One instrument entry in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentCfg {
    pub venue: String,
    pub pair: String,
    pub instrument_type: String,
    pub price_increment: Decimal,
    pub size_increment: Decimal,
    pub min_quantity: Decimal,
    pub max_quantity: Decimal,
    pub min_notional: Decimal,
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
    #[serde(default)]
    pub margin_init_ratio: Decimal,
    #[serde(default)]
    pub margin_maint_ratio: Decimal,
    #[serde(default)]
    pub max_leverage: Decimal,
    #[serde(default)]
    pub funding_interval_ms: i64,
}

impl InstrumentCfg {
    pub fn to_spec(&self) -> Result<InstrumentSpec, DeskError> {
        let itype = InstrumentType::parse(&self.instrument_type).ok_or_else(|| {
            DeskError::Config(format!("unknown instrument type: {}", self.instrument_type))
        })?;
        Ok(InstrumentSpec {
            id: InstrumentId::new(self.venue.clone(), self.pair.clone(), itype),
            price_increment: self.price_increment,
            size_increment: self.size_increment,
            min_quantity: self.min_quantity,
            max_quantity: self.max_quantity,
            min_notional: self.min_notional,
            maker_fee_rate: self.maker_fee_rate,
            taker_fee_rate: self.taker_fee_rate,
            margin_init_ratio: self.margin_init_ratio,
            margin_maint_ratio: self.margin_maint_ratio,
            max_leverage: self.max_leverage,
            funding_interval_ms: self.funding_interval_ms,
        })
    }
}

impl DeskConfig {
    /// Load configuration from files and environment.
    ///
    /// `fill.fill_probability` and `fill.extra_slip_probability` carry
    /// no baseline: loading fails until they are configured.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Desk defaults
            .set_default("desk.seed", 0)?
            .set_default("desk.valuation_asset", "USDT")?
            .set_default("desk.event_log_capacity", 10_000)?
            // Risk defaults (0 disables a check)
            .set_default("risk.max_position_notional", "0")?
            .set_default("risk.max_drawdown", "0")?
            // Persistence defaults
            .set_default("persistence.state_file", "./data/desk_state.json")?
            .set_default("persistence.min_interval_ms", 30_000)?
            // Engine defaults
            .set_default("engine.max_fills_per_order", 64)?
            .set_default("engine.min_fill_interval_ms", 1)?
            .set_default("engine.reject_crossing_maker", true)?
            .set_default("engine.retention_ms", 60_000)?
            .set_default("engine.prune_interval_ms", 10_000)?
            // Latency defaults
            .set_default("latency.submit_delay_ms", 0)?
            .set_default("latency.cancel_delay_ms", 0)?
            // Fill-model bands; the two probabilities are deliberately
            // NOT defaulted here.
            .set_default("fill.queue_participation", vec![0.2, 0.6])?
            .set_default("fill.partial_fill", vec![0.25, 1.0])?
            .set_default("fill.slippage_bps", 0.0)?
            .set_default("fill.adverse_selection_bps", 0.0)?
            .set_default("fill.queue_delay_ms", 0)?
            // Load config files if present
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (PAPERDESK_*)
            .add_source(Environment::with_prefix("PAPERDESK").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let desk_config: DeskConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration (fill.fill_probability and fill.extra_slip_probability are required)")?;

        Ok(desk_config)
    }

    /// Short config digest for startup logging.
    pub fn digest(&self) -> String {
        format!(
            "seed={} valuation={} instruments={} fill_p={:.2} risk_cap={}",
            self.desk.seed,
            self.desk.valuation_asset,
            self.instruments.len(),
            self.fill.fill_probability,
            self.risk.max_position_notional,
        )
    }
}

impl std::fmt::Display for DeskConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
