//! Window statistics, robust noise estimates and sample covariance.

/// Median absolute deviation to standard deviation for Gaussian noise.
pub const MAD_SCALE: f64 = 0.6745;

/// `sqrt(mean(x^2))`, accumulated in f64.
pub fn mean_square_root(x: &[f32]) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    let sum: f64 = x.iter().map(|&v| (v as f64) * (v as f64)).sum();
    (sum / x.len() as f64).sqrt() as f32
}

/// Median of `values`, averaging the two middle elements for even lengths.
/// Reorders `values`.
pub fn median_in_place(values: &mut [f32]) -> f32 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        upper
    } else {
        let below = lower.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        ((below as f64 + upper as f64) / 2.0) as f32
    }
}

/// `median(|x|) / 0.6745`. Uses `scratch` to avoid reallocating per window.
pub fn median_absolute_scaled(x: &[f32], scratch: &mut Vec<f32>) -> f32 {
    scratch.clear();
    scratch.extend(x.iter().map(|v| v.abs()));
    (median_in_place(scratch) as f64 / MAD_SCALE) as f32
}

/// Unbiased sample covariance of `n_obs` observations of `n_vars`
/// variables, `samples` laid out observation-major.
///
/// Returns the `n_vars x n_vars` matrix row-major. Fewer than two
/// observations give an all-zero matrix.
pub fn covariance(samples: &[f32], n_obs: usize, n_vars: usize) -> Vec<f64> {
    let mut cov = vec![0.0; n_vars * n_vars];
    if n_obs < 2 || samples.len() < n_obs * n_vars {
        return cov;
    }
    let mut mean = vec![0.0f64; n_vars];
    for obs in samples[..n_obs * n_vars].chunks_exact(n_vars) {
        for (m, &v) in mean.iter_mut().zip(obs) {
            *m += v as f64;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n_obs as f64);

    let mut centered = vec![0.0f64; n_vars];
    for obs in samples[..n_obs * n_vars].chunks_exact(n_vars) {
        for ((c, &v), m) in centered.iter_mut().zip(obs).zip(&mean) {
            *c = v as f64 - m;
        }
        for i in 0..n_vars {
            let ci = centered[i];
            let row = &mut cov[i * n_vars..(i + 1) * n_vars];
            for (r, &cj) in row[i..].iter_mut().zip(&centered[i..]) {
                *r += ci * cj;
            }
        }
    }
    let norm = 1.0 / (n_obs - 1) as f64;
    for i in 0..n_vars {
        for j in i..n_vars {
            let v = cov[i * n_vars + j] * norm;
            cov[i * n_vars + j] = v;
            cov[j * n_vars + i] = v;
        }
    }
    cov
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_square_root() {
        assert_relative_eq!(mean_square_root(&[3.0, -4.0]), (12.5f32).sqrt());
        assert_eq!(mean_square_root(&[]), 0.0);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median_in_place(&mut [5.0, 1.0, 3.0]), 3.0);
        assert_eq!(median_in_place(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_median_absolute_scaled() {
        let mut scratch = Vec::new();
        let v = median_absolute_scaled(&[-1.0, 2.0, -3.0], &mut scratch);
        assert_relative_eq!(v as f64, 2.0 / MAD_SCALE, epsilon = 1e-6);
    }

    #[test]
    fn test_covariance_two_vars() {
        // observations (1, 2), (2, 4), (3, 6)
        let cov = covariance(&[1.0, 2.0, 2.0, 4.0, 3.0, 6.0], 3, 2);
        assert_relative_eq!(cov[0], 1.0);
        assert_relative_eq!(cov[1], 2.0);
        assert_relative_eq!(cov[2], 2.0);
        assert_relative_eq!(cov[3], 4.0);
    }

    #[test]
    fn test_covariance_single_observation_is_zero() {
        assert_eq!(covariance(&[1.0, 2.0], 1, 2), vec![0.0; 4]);
    }
}
