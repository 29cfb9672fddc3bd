//! Butterworth IIR design and zero-phase filtering.
//!
//! Design follows the analog-prototype route: Butterworth poles on the unit
//! circle, frequency transform to the requested band with prewarped edges,
//! bilinear transform, then expansion to transfer-function coefficients.
//! Filtering runs in f64 in transposed direct form II.

use crate::{Error, Result};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Band shape of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandType {
    Lowpass,
    Highpass,
    Bandpass,
}

impl BandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BandType::Lowpass => "lowpass",
            BandType::Highpass => "highpass",
            BandType::Bandpass => "bandpass",
        }
    }
}

/// Band edges normalized to the Nyquist frequency, each in `(0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Band {
    Lowpass(f64),
    Highpass(f64),
    Bandpass(f64, f64),
}

impl Band {
    /// Build a band from cutoffs in Hz.
    ///
    /// Lowpass uses `lowpass_hz`, highpass uses `highpass_hz`, and bandpass
    /// passes `highpass_hz..lowpass_hz`.
    pub fn from_hz(
        band_type: BandType,
        lowpass_hz: Option<f64>,
        highpass_hz: Option<f64>,
        fs: f64,
    ) -> Result<Self> {
        let nyquist = fs / 2.0;
        let need = |hz: Option<f64>, name: &str| {
            hz.map(|f| f / nyquist).ok_or_else(|| {
                Error::InvalidCutoff(format!("{} filter requires {name}", band_type.as_str()))
            })
        };
        let band = match band_type {
            BandType::Lowpass => Band::Lowpass(need(lowpass_hz, "lowpass_hz")?),
            BandType::Highpass => Band::Highpass(need(highpass_hz, "highpass_hz")?),
            BandType::Bandpass => Band::Bandpass(
                need(highpass_hz, "highpass_hz")?,
                need(lowpass_hz, "lowpass_hz")?,
            ),
        };
        band.validate()?;
        Ok(band)
    }

    pub fn validate(&self) -> Result<()> {
        let check = |wn: f64| {
            if wn > 0.0 && wn < 1.0 {
                Ok(())
            } else {
                Err(Error::InvalidCutoff(format!(
                    "normalized cutoff {wn} must lie strictly between 0 and 1"
                )))
            }
        };
        match *self {
            Band::Lowpass(wn) | Band::Highpass(wn) => check(wn),
            Band::Bandpass(lo, hi) => {
                check(lo)?;
                check(hi)?;
                if lo >= hi {
                    return Err(Error::InvalidCutoff(format!(
                        "bandpass edges {lo} and {hi} are not increasing"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Transfer-function coefficients `b / a`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCoefficients {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

impl FilterCoefficients {
    pub fn new(b: Vec<f64>, a: Vec<f64>) -> Result<Self> {
        if b.is_empty() || a.first().map_or(true, |&a0| a0 == 0.0) {
            return Err(Error::InvalidParameter(
                "filter needs numerator taps and a nonzero leading denominator".to_string(),
            ));
        }
        Ok(Self { b, a })
    }

    /// Digital Butterworth filter of `order`.
    pub fn butterworth(order: usize, band: Band) -> Result<Self> {
        if order == 0 {
            return Err(Error::InvalidOrder(order));
        }
        band.validate()?;
        let (zeros, poles, gain) = analog_zpk(order, band);
        let (zeros, poles, gain) = bilinear(zeros, poles, gain);
        let b = poly(&zeros).into_iter().map(|c| c.re * gain).collect();
        let a = poly(&poles).into_iter().map(|c| c.re).collect();
        Ok(Self { b, a })
    }

    /// Number of taps, `max(len(b), len(a))`.
    pub fn n_taps(&self) -> usize {
        self.b.len().max(self.a.len())
    }

    /// Coefficients padded to equal length and divided by `a[0]`.
    fn normalized(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.n_taps();
        let a0 = self.a[0];
        let mut b: Vec<f64> = self.b.iter().map(|v| v / a0).collect();
        let mut a: Vec<f64> = self.a.iter().map(|v| v / a0).collect();
        b.resize(n, 0.0);
        a.resize(n, 0.0);
        (b, a)
    }

    /// Filter `x` forward, starting from state `zi` (zeros if `None`).
    /// Returns the output and the final state.
    pub fn lfilter(&self, x: &[f64], zi: Option<&[f64]>) -> (Vec<f64>, Vec<f64>) {
        let (b, a) = self.normalized();
        let order = b.len() - 1;
        let mut z = zi.map_or_else(|| vec![0.0; order], <[f64]>::to_vec);
        z.resize(order, 0.0);

        let mut y = Vec::with_capacity(x.len());
        for &xi in x {
            let yi = b[0] * xi + z.first().copied().unwrap_or(0.0);
            for j in 0..order {
                let next = if j + 1 < order { z[j + 1] } else { 0.0 };
                z[j] = b[j + 1] * xi + next - a[j + 1] * yi;
            }
            y.push(yi);
        }
        (y, z)
    }

    /// Initial state for a steady-state unit step response.
    pub fn lfilter_zi(&self) -> Result<Vec<f64>> {
        let (b, a) = self.normalized();
        let m = b.len() - 1;
        if m == 0 {
            return Ok(Vec::new());
        }
        // (I - companion(a)^T) zi = b[1:] - a[1:] * b[0]
        let mut matrix = vec![0.0; m * m];
        for i in 0..m {
            matrix[i * m] += a[i + 1];
            matrix[i * m + i] += 1.0;
            if i > 0 {
                matrix[(i - 1) * m + i] -= 1.0;
            }
        }
        let rhs: Vec<f64> = (0..m).map(|i| b[i + 1] - a[i + 1] * b[0]).collect();
        solve(matrix, rhs)
    }

    /// Forward-backward filtering with no padding.
    ///
    /// Each pass starts from the steady state for its first sample, so a
    /// constant input passes through unchanged when the DC gain is one.
    pub fn filtfilt(&self, x: &[f64]) -> Result<Vec<f64>> {
        let Some(&first) = x.first() else {
            return Ok(Vec::new());
        };
        let zi = self.lfilter_zi()?;
        let scaled = |v: f64| zi.iter().map(|z| z * v).collect::<Vec<_>>();

        let (mut forward, _) = self.lfilter(x, Some(&scaled(first)));
        forward.reverse();
        let last = forward[0];
        let (mut backward, _) = self.lfilter(&forward, Some(&scaled(last)));
        backward.reverse();
        Ok(backward)
    }

    /// Magnitude response at normalized frequency `w` (1 = Nyquist).
    pub fn gain_at(&self, w: f64) -> f64 {
        let z = Complex64::from_polar(1.0, -PI * w);
        let eval = |c: &[f64]| {
            c.iter()
                .rev()
                .fold(Complex64::new(0.0, 0.0), |acc, &v| acc * z + v)
        };
        (eval(&self.b) / eval(&self.a)).norm()
    }
}

/// Analog zeros, poles and gain of the band-transformed prototype.
fn analog_zpk(order: usize, band: Band) -> (Vec<Complex64>, Vec<Complex64>, f64) {
    let n = order as f64;
    let prototype: Vec<Complex64> = (0..order)
        .map(|k| {
            let m = -n + 1.0 + 2.0 * k as f64;
            -Complex64::new(0.0, PI * m / (2.0 * n)).exp()
        })
        .collect();
    // fs = 2 convention: edges prewarped to 4 * tan(pi * wn / 2)
    let warp = |wn: f64| 4.0 * (PI * wn / 2.0).tan();
    let zero = Complex64::new(0.0, 0.0);

    match band {
        Band::Lowpass(wn) => {
            let wo = warp(wn);
            let poles = prototype.iter().map(|&p| p * wo).collect();
            (Vec::new(), poles, wo.powi(order as i32))
        }
        Band::Highpass(wn) => {
            let wo = Complex64::new(warp(wn), 0.0);
            let poles = prototype.iter().map(|&p| wo / p).collect();
            let denom = prototype
                .iter()
                .fold(Complex64::new(1.0, 0.0), |acc, &p| acc * (-p));
            (vec![zero; order], poles, (Complex64::new(1.0, 0.0) / denom).re)
        }
        Band::Bandpass(lo, hi) => {
            let (w1, w2) = (warp(lo), warp(hi));
            let bw = w2 - w1;
            let wo2 = w1 * w2;
            let mut poles = Vec::with_capacity(2 * order);
            for &p in &prototype {
                let scaled = p * (bw / 2.0);
                let root = (scaled * scaled - wo2).sqrt();
                poles.push(scaled + root);
                poles.push(scaled - root);
            }
            (vec![zero; order], poles, bw.powi(order as i32))
        }
    }
}

/// Bilinear transform with `fs = 2`.
fn bilinear(
    zeros: Vec<Complex64>,
    poles: Vec<Complex64>,
    gain: f64,
) -> (Vec<Complex64>, Vec<Complex64>, f64) {
    let fs2 = Complex64::new(4.0, 0.0);
    let degree = poles.len() - zeros.len();
    let num = zeros
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, &z| acc * (fs2 - z));
    let den = poles
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, &p| acc * (fs2 - p));
    let mut digital_zeros: Vec<Complex64> =
        zeros.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
    digital_zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(degree));
    let digital_poles = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
    (digital_zeros, digital_poles, gain * (num / den).re)
}

/// Monic polynomial with the given roots, highest power first.
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &r in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * r;
        }
        coeffs = next;
    }
    coeffs
}

/// Solve the dense `m x m` system by Gaussian elimination with partial
/// pivoting.
fn solve(mut matrix: Vec<f64>, mut rhs: Vec<f64>) -> Result<Vec<f64>> {
    let m = rhs.len();
    for col in 0..m {
        let pivot = (col..m)
            .max_by(|&i, &j| {
                matrix[i * m + col]
                    .abs()
                    .total_cmp(&matrix[j * m + col].abs())
            })
            .unwrap_or(col);
        if matrix[pivot * m + col].abs() < f64::EPSILON * 1e-6 {
            return Err(Error::Singular);
        }
        if pivot != col {
            for k in 0..m {
                matrix.swap(col * m + k, pivot * m + k);
            }
            rhs.swap(col, pivot);
        }
        for row in col + 1..m {
            let factor = matrix[row * m + col] / matrix[col * m + col];
            for k in col..m {
                matrix[row * m + k] -= factor * matrix[col * m + k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut x = vec![0.0; m];
    for row in (0..m).rev() {
        let tail: f64 = (row + 1..m).map(|k| matrix[row * m + k] * x[k]).sum();
        x[row] = (rhs[row] - tail) / matrix[row * m + row];
    }
    Ok(x)
}
