//! Synthetic data generation (seeded simulations for demos and tests).

pub mod sample;

pub use sample::*;
