//! Walk-forward VaR forecasting: the rolling engine and its cancellation token.

pub mod cancel;
pub mod engine;

pub use cancel::*;
pub use engine::*;
