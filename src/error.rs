//! Error taxonomy for the paper desk
//!
//! Two distinct failure channels:
//! - `RejectReason`: an order was never accepted. Reported synchronously
//!   inside an `OrderRejected` event with a machine-readable reason,
//!   never returned as `Err`.
//! - `DeskError`: infrastructure failures (config, persistence, routing)
//!   that the caller must handle.

use rust_decimal::Decimal;
use thiserror::Error;

/// Why an order was refused at submission.
///
/// The `Display` form is the machine-readable reason string carried on
/// `OrderRejected` events; downstream consumers match on it, so variants
/// render as stable snake_case tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("invalid_price")]
    InvalidPrice,
    #[error("invalid_quantity")]
    InvalidQuantity,
    #[error("below_min_quantity")]
    BelowMinQuantity,
    #[error("above_max_quantity")]
    AboveMaxQuantity,
    #[error("below_min_notional")]
    BelowMinNotional,
    /// A maker-only order would cross the book at submission.
    #[error("maker_would_cross")]
    MakerWouldCross,
    #[error("insufficient_balance")]
    InsufficientBalance,
    /// Projected position notional would exceed the per-instrument cap.
    #[error("risk_position_cap")]
    RiskPositionCap,
    /// Portfolio drawdown already exceeds the hard stop.
    #[error("risk_drawdown_stop")]
    RiskDrawdownStop,
    /// Market order submitted before any book snapshot arrived.
    #[error("no_market_data")]
    NoMarketData,
    #[error("unknown_order")]
    UnknownOrder,
}

/// Infrastructure-level failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum DeskError {
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("instrument already registered: {0}")]
    DuplicateInstrument(String),

    #[error("ledger: insufficient {asset} (requested {requested}, available {available})")]
    InsufficientFunds {
        asset: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("state persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
