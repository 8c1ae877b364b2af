//! Model fitting orchestration.
//!
//! Responsibilities:
//!
//! - generate deterministic starting grids per variant
//! - evaluate the grid (parallel) and refine the best start by maximum likelihood
//! - rank candidate specs by information criteria + adequacy guardrails

pub mod fitter;
pub mod optimizer;
pub mod selection;
pub mod start_grid;

pub use fitter::*;
pub use optimizer::*;
pub use selection::*;
pub use start_grid::*;
