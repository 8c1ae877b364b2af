//! Conditional-heteroskedasticity model implementations.
//!
//! Models are implemented as small, pure functions over a parameter vector so
//! that fitting/search code can stay generic:
//!
//! - `params`: named view of the flat parameter vector
//! - `recursion`: mean filter, variance recursions, log-likelihood

pub mod params;
pub mod recursion;

pub use params::*;
pub use recursion::*;
