//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the immutable input series (`ReturnSeries`)
//! - model descriptions (`ModelSpec`, `Variant`, `Distribution`)
//! - forecast and backtest outputs (`VarEstimate`, `StepResult`, `BacktestResult`)

pub mod series;
pub mod spec;
pub mod types;

pub use series::*;
pub use spec::*;
pub use types::*;
