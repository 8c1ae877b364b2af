//! Reporting: terminal summaries of ingest, rolling runs, backtests and selection.

pub mod format;

pub use format::*;
