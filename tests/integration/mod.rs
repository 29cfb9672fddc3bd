//! Integration test modules for ephys
//!
//! - scenarios: acceptance runs for RMS, decimation and spike extraction
//! - engines: results independent of the memory budget, progress, cancellation
//! - store: on-disk round trips, block data and destructive edits

pub mod engines;
pub mod scenarios;
pub mod store;
