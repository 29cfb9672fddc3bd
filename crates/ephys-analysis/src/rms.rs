//! Running RMS of the noise floor over sliding windows.
//!
//! ## Chunking
//!
//! Chunks have no left overlap and `window - step` samples of right
//! overlap, with cores aligned to `step`. A full chunk therefore yields
//! exactly `core / step` windows and window `i` of the whole recording
//! spans `[step * i, step * i + window)`.
//!
//! The last chunk may be short; samples past the last whole window are
//! recorded as `samples_discarded`.

use crate::provenance::{stamp_source, write_parameters};
use crate::{Error, Result};
use ephys_core::recording::all_channels;
use ephys_core::store::join;
use ephys_core::{
    ArrayData, AttrValue, ChunkConfig, ChunkReader, ChunkRequest, Completion, Dtype, Progress,
    Recording, Store, StridedWindows,
};
use ephys_dsp::stats::{mean_square_root, median_absolute_scaled};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Output array name under the output group.
pub const RMS_ARRAY: &str = "rms";

/// Per-window statistic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RmsEstimator {
    /// `sqrt(mean(x^2))`
    #[default]
    MeanSquareRoot,
    /// `median(|x|) / 0.6745`
    MedianAbsoluteScaled,
}

impl RmsEstimator {
    pub fn as_str(&self) -> &'static str {
        match self {
            RmsEstimator::MeanSquareRoot => "mean",
            RmsEstimator::MedianAbsoluteScaled => "median",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmsParams {
    pub window_duration_s: f64,
    pub window_step_s: f64,
    pub estimator: RmsEstimator,
    /// Zero-based channels; `None` processes every channel.
    pub channels: Option<Vec<usize>>,
}

impl Default for RmsParams {
    fn default() -> Self {
        Self {
            window_duration_s: 1.0,
            window_step_s: 0.25,
            estimator: RmsEstimator::MeanSquareRoot,
            channels: None,
        }
    }
}

impl RmsParams {
    /// Window and step in samples at `fs`.
    pub fn samples(&self, fs: f64) -> Result<(usize, usize)> {
        let window = (self.window_duration_s * fs) as usize;
        let step = (self.window_step_s * fs) as usize;
        if window == 0 || step == 0 {
            return Err(Error::Configuration(format!(
                "window ({}s) and step ({}s) must each span at least one sample at {fs} Hz",
                self.window_duration_s, self.window_step_s
            )));
        }
        if step > window {
            return Err(Error::Configuration(format!(
                "window step ({step} samples) exceeds window ({window} samples)"
            )));
        }
        Ok((window, step))
    }
}

/// Resolve and check a channel subset.
pub(crate) fn resolve_channels(
    source: &dyn Recording,
    channels: Option<&[usize]>,
) -> Result<Vec<usize>> {
    let channels = channels.map_or_else(|| all_channels(source), <[usize]>::to_vec);
    if channels.is_empty() {
        return Err(Error::Configuration("no channels selected".to_string()));
    }
    let n = source.n_channels();
    if let Some(&bad) = channels.iter().find(|&&c| c >= n) {
        return Err(Error::Configuration(format!(
            "channel {bad} out of range for {n} channels"
        )));
    }
    Ok(channels)
}

/// Compute the running RMS of `source` into `<output>/rms`.
///
/// The output is a `(channels, windows)` f32 array sampled at
/// `1 / window_step_s`. On cancellation the windows already appended are
/// kept and `aborted` is set.
pub fn running_rms(
    source: &dyn Recording,
    sink: &mut dyn Store,
    output: &str,
    params: &RmsParams,
    chunk: &ChunkConfig,
    progress: &mut dyn Progress,
) -> Result<Completion> {
    chunk.validate()?;
    let fs = source.fs();
    let (window, step) = params.samples(fs)?;
    let channels = resolve_channels(source, params.channels.as_deref())?;
    let total = source.n_samples();
    let plan = ChunkRequest::new(total, channels.len(), source.item_size())
        .with_overlap(0, window - step)
        .with_alignment(step)
        .with_read_overhead(source.read_overhead(&channels))
        .plan(chunk.memory_budget_bytes)?;

    let path = join(output, RMS_ARRAY);
    sink.get_or_create_group(output)?;
    sink.create_array(&path, &[channels.len(), 0], Dtype::F32, 1)?;
    stamp_source(sink, output, source)?;
    write_parameters(sink, &path, params)?;
    source.write_provenance(sink, &path)?;
    let attrs: [(&str, AttrValue); 12] = [
        ("processed_channels", channels.as_slice().into()),
        ("channels", channels.len().into()),
        ("window_duration", params.window_duration_s.into()),
        ("window_duration_samples", window.into()),
        ("window_step", params.window_step_s.into()),
        ("window_step_samples", step.into()),
        ("chunk_samples", plan.chunk_samples.into()),
        ("chunk_left_overlap", plan.left_overlap.into()),
        ("chunk_right_overlap", plan.right_overlap.into()),
        ("algorithm", params.estimator.as_str().into()),
        ("fs", (1.0 / params.window_step_s).into()),
        ("t0", 0.0.into()),
    ];
    for (key, value) in attrs {
        sink.set_attr(&path, key, value)?;
    }
    info!(
        total_samples = total,
        window,
        step,
        chunks = plan.n_chunks(),
        "running rms"
    );

    let mut scratch = Vec::with_capacity(window);
    let mut windows_written = 0usize;
    let mut samples_processed = 0usize;
    let mut aborted = false;
    let mut last_shape = None;

    for chunk in ChunkReader::new(source, plan, channels.clone()) {
        let chunk = chunk?;
        let view = StridedWindows::new(&chunk.block, window, step)?;
        let (n_ch, n_windows, _) = view.shape();
        if chunk.is_last {
            last_shape = Some(view.shape());
        }

        let mut values = Vec::with_capacity(n_ch * n_windows);
        for c in 0..n_ch {
            values.extend(view.windows(c).map(|w| match params.estimator {
                RmsEstimator::MeanSquareRoot => mean_square_root(w),
                RmsEstimator::MedianAbsoluteScaled => median_absolute_scaled(w, &mut scratch),
            }));
        }
        if n_windows > 0 {
            sink.append(&path, &ArrayData::F32(values))?;
        }
        windows_written += n_windows;
        samples_processed = chunk.core.end;

        let message = format!("{windows_written} windows");
        if progress.report(samples_processed, total, &message).is_break() {
            warn!(samples_processed, "running rms cancelled");
            aborted = true;
            break;
        }
    }

    let covered = if windows_written == 0 {
        0
    } else {
        (windows_written - 1) * step + window
    };
    if !aborted {
        let discarded = total - covered;
        if discarded > 0 {
            warn!(discarded, "samples after the last whole window were discarded");
        }
        sink.set_attr(&path, "samples_discarded", discarded.into())?;
    }
    if let Some((c, w, s)) = last_shape {
        sink.set_attr(&path, "last_chunk_new_shape", AttrValue::from(&[c, w, s][..]))?;
    }
    let shape = sink.shape(&path)?;
    sink.set_attr(&path, "new_shape", shape.as_slice().into())?;
    sink.set_attr(&path, "aborted", aborted.into())?;
    sink.set_attr(&path, "samples_processed", samples_processed.into())?;
    info!(windows = windows_written, aborted, "running rms finished");
    Ok(Completion::new(aborted, samples_processed, total))
}
