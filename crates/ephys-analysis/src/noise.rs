//! Robust per-channel noise estimates for setting spike thresholds.

use crate::rms::resolve_channels;
use crate::{Error, Result};
use ephys_core::Recording;
use ephys_dsp::median_absolute_scaled;
use tracing::debug;

/// Seconds read from the start of the recording by default.
pub const DEFAULT_NOISE_DURATION_S: f64 = 16.0;

/// `median(|x|) / 0.6745` per channel over the first `duration_s` seconds
/// (or the whole recording if shorter).
pub fn estimate_noise(
    source: &dyn Recording,
    channels: Option<&[usize]>,
    duration_s: f64,
) -> Result<Vec<f64>> {
    if !(duration_s.is_finite() && duration_s > 0.0) {
        return Err(Error::Configuration(format!(
            "noise segment of {duration_s}s is not positive"
        )));
    }
    let channels = resolve_channels(source, channels)?;
    let n = ((duration_s * source.fs()) as usize).min(source.n_samples());
    if n == 0 {
        return Err(Error::Configuration(
            "noise segment contains no samples".to_string(),
        ));
    }
    let block = source.read(0..n, &channels)?;
    let mut scratch = Vec::with_capacity(n);
    let noise: Vec<f64> = block
        .channels()
        .map(|x| median_absolute_scaled(x, &mut scratch) as f64)
        .collect();
    debug!(samples = n, ?noise, "estimated noise");
    Ok(noise)
}
