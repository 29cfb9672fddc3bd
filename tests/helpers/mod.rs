//! Test helpers for ephys integration tests
//!
//! Synthetic recordings, deterministic signal generators and store fixtures.

#![allow(dead_code)]

pub mod tolerances;

use ephys::core::{ArrayData, Dtype};
use ephys::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::ops::ControlFlow;

/// Create an analyzer with a given memory budget.
pub fn test_analyzer(memory_budget: usize) -> Analyzer {
    Analyzer::builder()
        .memory_budget(memory_budget)
        .build()
        .expect("Failed to create test analyzer")
}

// =============================================================================
// Deterministic Signal Generators
// =============================================================================

/// Sine wave of `frequency` Hz.
pub fn generate_sine(frequency: f64, fs: f64, num_samples: usize, amplitude: f32) -> Vec<f32> {
    (0..num_samples)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f64 / fs).sin() as f32)
        .collect()
}

/// Constant signal.
pub fn generate_dc(value: f32, num_samples: usize) -> Vec<f32> {
    vec![value; num_samples]
}

/// Zeros with a single sample set to `amplitude` at `position`.
pub fn generate_impulse(num_samples: usize, position: usize, amplitude: f32) -> Vec<f32> {
    let mut samples = vec![0.0; num_samples];
    if position < num_samples {
        samples[position] = amplitude;
    }
    samples
}

/// Seeded Gaussian noise (Box-Muller).
pub fn generate_noise(num_samples: usize, std: f64, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_samples)
        .map(|_| {
            let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
            let u2: f64 = rng.gen();
            (std * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()) as f32
        })
        .collect()
}

/// Sample `i` holds the value `i`.
pub fn generate_integer_staircase(num_samples: usize) -> Vec<f32> {
    (0..num_samples).map(|i| i as f32).collect()
}

// =============================================================================
// Analysis
// =============================================================================

/// RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Peak absolute amplitude.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

pub fn signals_approx_equal(a: &[f32], b: &[f32], tolerance: f32) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
}

// =============================================================================
// Store Fixtures
// =============================================================================

/// Read a whole f32 array.
pub fn read_f32(store: &dyn Store, path: &str) -> Vec<f32> {
    store.read(path).unwrap().into_f32(path).unwrap()
}

/// Read a whole i64 array.
pub fn read_i64(store: &dyn Store, path: &str) -> Vec<i64> {
    store.read(path).unwrap().into_i64(path).unwrap()
}

/// Write `channels` as an acquisition file: the raw waveform at
/// `<experiment>/data/physiology/raw`, every contact and TTL node, plus a
/// trial table under `<experiment>/data/trial_log`.
pub fn write_experiment(
    store: &mut dyn Store,
    experiment: &str,
    channels: &[Vec<f32>],
    fs: f64,
) {
    let raw = format!("{experiment}/data/physiology/raw");
    let n_samples = channels.first().map_or(0, Vec::len);
    store
        .create_array(&raw, &[channels.len(), 0], Dtype::F32, 1)
        .unwrap();
    store.append(&raw, &ArrayData::F32(channels.concat())).unwrap();
    store.set_attr(&raw, "fs", fs.into()).unwrap();

    for node in &ephys::analysis::destructive::ACQUISITION_NODES[1..] {
        let path = format!("{experiment}/data/{node}");
        store.create_array(&path, &[0], Dtype::I8, 0).unwrap();
        store
            .append(&path, &ArrayData::I8(vec![1; n_samples / 10]))
            .unwrap();
        store.set_attr(&path, "fs", (fs / 10.0).into()).unwrap();
    }

    let trials = format!("{experiment}/data/trial_log");
    store
        .put_array(&trials, &[3], &ArrayData::F64(vec![0.5, 1.5, 2.5]))
        .unwrap();
    store.set_attr(&trials, "units", "s".into()).unwrap();
}

// =============================================================================
// Progress
// =============================================================================

/// Collects every progress report and never cancels.
#[derive(Default)]
pub struct Reports(pub Vec<(usize, usize, String)>);

impl Progress for Reports {
    fn report(
        &mut self,
        samples_processed: usize,
        total_samples: usize,
        message: &str,
    ) -> ControlFlow<()> {
        self.0
            .push((samples_processed, total_samples, message.to_string()));
        ControlFlow::Continue(())
    }
}

/// Cancels once `fraction` of the recording has been processed.
pub fn cancel_at(fraction: f64) -> impl FnMut(usize, usize, &str) -> ControlFlow<()> {
    move |done: usize, total: usize, _: &str| {
        if done as f64 >= fraction * total as f64 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}
