//! Tolerance constants for numeric comparisons.
//!
//! Chunked and whole-signal paths run the same arithmetic in a different
//! order, so each comparison gets the tolerance its operation needs.

/// Operations that should be exact up to f32 rounding (copies, zeroing).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Filtering and convolution, where chunk seams reorder accumulation.
pub const DSP_EPSILON: f32 = 1e-4;

/// Zero-phase filters started from steady state settle within this.
pub const FILTER_SETTLE_EPSILON: f32 = 1e-3;

/// Relative error allowed on robust noise estimates from finite samples.
pub const NOISE_RELATIVE_EPSILON: f64 = 0.05;
