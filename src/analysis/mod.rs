//! Analysis modules.
//!
//! The time-window aggregation is the only transformation the pipeline
//! performs on the rows it reads.

pub mod aggregator;

pub use aggregator::*;
