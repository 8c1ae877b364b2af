//! Input/output helpers.
//!
//! - CSV ingest of returns or prices (`ingest`)
//! - VaR stream, series and summary exports (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
