//! Models module.
pub mod slope_one;
