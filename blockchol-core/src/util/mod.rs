//! Utility functions.
//!
//! Phase timing for the driver.

pub mod perf;
