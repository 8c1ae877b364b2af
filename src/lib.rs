//! `garch-var` library crate.
//!
//! Rolling GARCH-family Value-at-Risk: fit volatility models on expanding
//! prefixes, forecast one step ahead, scale an empirical quantile, and backtest
//! the resulting thresholds against realized returns.
//!
//! The binary (`gv`) is a thin wrapper around this library so the core stays
//! testable without spawning processes.

pub mod app;
pub mod backtest;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod rolling;
