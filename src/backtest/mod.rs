//! Out-of-sample VaR backtesting.

pub mod evaluator;

pub use evaluator::*;
