//! Complex Morlet wavelets for time-frequency decomposition.

use crate::{Error, Result};
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Complex Morlet kernel at `freq` Hz with `n_cycles` cycles.
///
/// The Gaussian envelope has `sigma_t = n_cycles / (2 pi freq)` and is
/// sampled out to `5 sigma_t` on both sides of zero, giving an odd length.
/// The kernel is scaled to an L2 norm of `sqrt(2)`.
pub fn morlet(fs: f64, freq: f64, n_cycles: f64) -> Result<Vec<Complex64>> {
    if [fs, freq, n_cycles].iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(Error::InvalidParameter(format!(
            "morlet needs positive fs, frequency and cycles (got {fs}, {freq}, {n_cycles})"
        )));
    }
    let sigma = n_cycles / (2.0 * PI * freq);
    let half = (5.0 * sigma * fs).ceil().max(1.0) as usize;
    let times = (1 - half as isize..half as isize).map(|k| k as f64 / fs);

    let mut kernel: Vec<Complex64> = times
        .map(|t| {
            let envelope = (-t * t / (2.0 * sigma * sigma)).exp();
            Complex64::from_polar(envelope, 2.0 * PI * freq * t)
        })
        .collect();
    let norm = kernel.iter().map(|w| w.norm_sqr()).sum::<f64>().sqrt();
    let scale = 1.0 / (0.5f64.sqrt() * norm);
    for w in &mut kernel {
        *w *= scale;
    }
    Ok(kernel)
}

/// One Morlet kernel per frequency.
#[derive(Debug, Clone)]
pub struct MorletBank {
    pub fs: f64,
    pub frequencies: Vec<f64>,
    pub cycles: f64,
    pub kernels: Vec<Vec<Complex64>>,
}

impl MorletBank {
    pub fn new(fs: f64, frequencies: &[f64], cycles: f64) -> Result<Self> {
        if frequencies.is_empty() {
            return Err(Error::InvalidParameter(
                "at least one frequency is required".to_string(),
            ));
        }
        let kernels = frequencies
            .iter()
            .map(|&f| morlet(fs, f, cycles))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            fs,
            frequencies: frequencies.to_vec(),
            cycles,
            kernels,
        })
    }

    /// Length of the longest kernel.
    pub fn max_len(&self) -> usize {
        self.kernels.iter().map(Vec::len).max().unwrap_or(0)
    }
}
