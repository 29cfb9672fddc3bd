//! Offline DSP for multi-channel physiology: Butterworth design with
//! zero-phase filtering, complex Morlet wavelets with FFT convolution,
//! robust window statistics, sample covariance and channel referencing.

mod error;
pub use error::{Error, Result};

pub mod convolve;
pub mod iir;
pub mod morlet;
pub mod reference;
pub mod stats;

pub use convolve::{convolve_same, FftConvolver};
pub use iir::{Band, BandType, FilterCoefficients};
pub use morlet::{morlet, MorletBank};
pub use reference::{apply_reference, diff_matrix, ReferenceMode};
pub use stats::{covariance, mean_square_root, median_absolute_scaled, MAD_SCALE};

pub use rustfft::num_complex::Complex64;
