//! "Same"-length convolution of a real signal with complex kernels.
//!
//! Output sample `i` is full-convolution sample `i + (m - 1) / 2` for a
//! kernel of length `m`, so an odd symmetric kernel is centered on `i`.
//! The output always has the signal's length.

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use std::collections::HashMap;

/// Direct O(n m) same-length convolution.
pub fn convolve_same(signal: &[f32], kernel: &[Complex64]) -> Vec<Complex64> {
    let n = signal.len();
    let m = kernel.len();
    if m == 0 {
        return vec![Complex64::new(0.0, 0.0); n];
    }
    let offset = (m - 1) / 2;
    (0..n)
        .map(|i| {
            let k = i + offset;
            let mut acc = Complex64::new(0.0, 0.0);
            // full[k] = sum_j signal[j] * kernel[k - j]
            let lo = k.saturating_sub(m - 1);
            let hi = k.min(n - 1);
            for j in lo..=hi {
                acc += kernel[k - j] * signal[j] as f64;
            }
            acc
        })
        .collect()
}

/// FFT convolver for a fixed bank of kernels.
///
/// Kernel spectra are cached per transform size, so repeated chunks of the
/// same length only transform the signal.
pub struct FftConvolver {
    kernels: Vec<Vec<Complex64>>,
    planner: FftPlanner<f64>,
    spectra: HashMap<usize, Vec<Vec<Complex64>>>,
}

impl FftConvolver {
    pub fn new(kernels: Vec<Vec<Complex64>>) -> Self {
        Self {
            kernels,
            planner: FftPlanner::new(),
            spectra: HashMap::new(),
        }
    }

    pub fn n_kernels(&self) -> usize {
        self.kernels.len()
    }

    fn kernel_spectra(&mut self, size: usize) -> &[Vec<Complex64>] {
        let kernels = &self.kernels;
        let planner = &mut self.planner;
        self.spectra.entry(size).or_insert_with(|| {
            let fft = planner.plan_fft_forward(size);
            kernels
                .iter()
                .map(|k| {
                    let mut buffer = k.clone();
                    buffer.resize(size, Complex64::new(0.0, 0.0));
                    fft.process(&mut buffer);
                    buffer
                })
                .collect()
        })
    }

    /// Convolve `signal` with every kernel; one same-length output per kernel.
    pub fn convolve_same(&mut self, signal: &[f32]) -> Vec<Vec<Complex64>> {
        let n = signal.len();
        if n == 0 {
            return vec![Vec::new(); self.kernels.len()];
        }
        let max_len = self.kernels.iter().map(Vec::len).max().unwrap_or(1);
        let size = (n + max_len - 1).next_power_of_two();

        let mut spectrum: Vec<Complex64> = signal
            .iter()
            .map(|&s| Complex64::new(s as f64, 0.0))
            .collect();
        spectrum.resize(size, Complex64::new(0.0, 0.0));
        let forward = self.planner.plan_fft_forward(size);
        forward.process(&mut spectrum);
        let inverse = self.planner.plan_fft_inverse(size);

        let lens: Vec<usize> = self.kernels.iter().map(Vec::len).collect();
        let scale = 1.0 / size as f64;
        let spectra = self.kernel_spectra(size);
        spectra
            .iter()
            .zip(lens)
            .map(|(kernel, m)| {
                let mut buffer: Vec<Complex64> =
                    spectrum.iter().zip(kernel).map(|(&a, &b)| a * b).collect();
                inverse.process(&mut buffer);
                let offset = m.saturating_sub(1) / 2;
                buffer[offset..offset + n].iter().map(|&c| c * scale).collect()
            })
            .collect()
    }
}
