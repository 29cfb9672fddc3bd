//! Channel re-referencing.

use serde::{Deserialize, Serialize};

/// How channels are referenced before filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// Channels are used as recorded.
    #[default]
    None,
    /// Each channel minus the mean of every other good channel.
    AllGood,
}

impl ReferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceMode::None => "none",
            ReferenceMode::AllGood => "all_good",
        }
    }
}

/// `n x n` row-major referencing matrix; output channel `i` is
/// `sum_j m[i][j] * x[j]`.
pub fn diff_matrix(n_channels: usize, bad_channels: &[usize], mode: ReferenceMode) -> Vec<f64> {
    let n = n_channels;
    let mut matrix = vec![0.0; n * n];
    for i in 0..n {
        matrix[i * n + i] = 1.0;
    }
    if mode == ReferenceMode::None {
        return matrix;
    }
    let good: Vec<usize> = (0..n).filter(|c| !bad_channels.contains(c)).collect();
    for i in 0..n {
        let others: Vec<usize> = good.iter().copied().filter(|&j| j != i).collect();
        if others.is_empty() {
            continue;
        }
        let weight = 1.0 / others.len() as f64;
        for j in others {
            matrix[i * n + j] -= weight;
        }
    }
    matrix
}

/// Apply a referencing matrix to channel-major samples.
///
/// `input` holds every recording channel (`n` rows of `n_samples`); the
/// result holds only the rows listed in `outputs`, in that order.
pub fn apply_reference(
    matrix: &[f64],
    input: &[f32],
    n_samples: usize,
    outputs: &[usize],
) -> Vec<f32> {
    let n = if n_samples == 0 { 0 } else { input.len() / n_samples };
    let mut out = vec![0.0f32; outputs.len() * n_samples];
    let mut acc = vec![0.0f64; n_samples];
    for (slot, &i) in outputs.iter().enumerate() {
        acc.iter_mut().for_each(|a| *a = 0.0);
        for j in 0..n {
            let w = matrix[i * n + j];
            if w == 0.0 {
                continue;
            }
            let row = &input[j * n_samples..(j + 1) * n_samples];
            for (a, &x) in acc.iter_mut().zip(row) {
                *a += w * x as f64;
            }
        }
        for (o, a) in out[slot * n_samples..(slot + 1) * n_samples]
            .iter_mut()
            .zip(&acc)
        {
            *o = *a as f32;
        }
    }
    out
}
