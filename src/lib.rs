//! PaperDesk Library
//!
//! Deterministic, exchange-agnostic order-matching and
//! portfolio-accounting engine for multi-instrument paper trading.

pub mod bridge;
pub mod config;
pub mod desk;
pub mod engine;
pub mod error;
pub mod events;
pub mod feed;
pub mod fees;
pub mod fill;
pub mod funding;
pub mod latency;
pub mod ledger;
pub mod portfolio;
pub mod position;
pub mod state;
pub mod types;
