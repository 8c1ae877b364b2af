//! Mathematical utilities: sample statistics, empirical quantiles and
//! numerical Hessians.

pub mod hessian;
pub mod quantile;
pub mod stats;

pub use hessian::*;
pub use quantile::*;
pub use stats::*;
