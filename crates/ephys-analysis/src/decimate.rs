//! Zero-phase low-pass filtering and downsampling.
//!
//! The Butterworth low-pass has normalized cutoff `1 / q`, the Nyquist of
//! the target rate. Each chunk is read with `3 * n_taps` samples of overlap
//! on both sides, filtered forward and backward, trimmed to its core and
//! subsampled every `q` samples. Cores are aligned to `q`, so the output
//! phase never drifts across chunk seams.

use crate::provenance::{copy_block_data, stamp_source, write_parameters, BlockData};
use crate::{Error, Result};
use ephys_core::recording::all_channels;
use ephys_core::store::join;
use ephys_core::{
    ArrayData, AttrValue, ChunkConfig, ChunkReader, ChunkRequest, Completion, Dtype, Progress,
    Recording, Store,
};
use ephys_dsp::{Band, FilterCoefficients};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Output array name under the output group.
pub const LFP_ARRAY: &str = "lfp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecimateParams {
    /// Decimation factor; overrides `target_rate` when set.
    pub factor: Option<usize>,
    /// Desired output rate in Hz.
    pub target_rate: f64,
    pub filter_order: usize,
    pub include_block_data: bool,
}

impl Default for DecimateParams {
    fn default() -> Self {
        Self {
            factor: None,
            target_rate: 600.0,
            filter_order: 4,
            include_block_data: true,
        }
    }
}

impl DecimateParams {
    /// Decimation factor for a source rate: `factor`, or
    /// `floor(fs / target_rate)`.
    pub fn factor_for(&self, fs: f64) -> Result<usize> {
        let q = match self.factor {
            Some(q) => q,
            None if self.target_rate > 0.0 => (fs / self.target_rate).floor() as usize,
            None => {
                return Err(Error::Configuration(format!(
                    "target rate {} must be positive",
                    self.target_rate
                )))
            }
        };
        if q < 2 {
            return Err(Error::Configuration(format!(
                "decimation factor {q} from {fs} Hz leaves nothing to decimate"
            )));
        }
        Ok(q)
    }

    /// Anti-aliasing filter for factor `q`.
    pub fn design(&self, q: usize) -> Result<FilterCoefficients> {
        // 0.5 * (fs / q) / (0.5 * fs)
        let cutoff = 1.0 / q as f64;
        Ok(FilterCoefficients::butterworth(self.filter_order, Band::Lowpass(cutoff))?)
    }
}

/// Decimate every channel of `source` into `<output>/lfp`.
///
/// The output is a `(channels, samples)` f32 array at `fs / q`. Each core
/// of `L` samples contributes `floor(L / q)` outputs; only the last core
/// can leave a remainder, recorded as `samples_discarded`.
pub fn decimate(
    source: &dyn Recording,
    sink: &mut dyn Store,
    output: &str,
    params: &DecimateParams,
    chunk: &ChunkConfig,
    block_data: Option<BlockData<'_>>,
    progress: &mut dyn Progress,
) -> Result<Completion> {
    chunk.validate()?;
    let fs = source.fs();
    let q = params.factor_for(fs)?;
    let coefficients = params.design(q)?;
    let overlap = 3 * coefficients.n_taps();
    let channels = all_channels(source);
    let total = source.n_samples();
    let plan = ChunkRequest::new(total, channels.len(), source.item_size())
        .with_overlap(overlap, overlap)
        .with_alignment(q)
        .with_read_overhead(source.read_overhead(&channels))
        .plan(chunk.memory_budget_bytes)?;
    let out_fs = fs / q as f64;

    let path = join(output, LFP_ARRAY);
    sink.get_or_create_group(output)?;
    sink.create_array(&path, &[channels.len(), 0], Dtype::F32, 1)?;
    stamp_source(sink, output, source)?;
    write_parameters(sink, &path, params)?;
    let attrs: [(&str, AttrValue); 10] = [
        ("q", q.into()),
        ("fs", out_fs.into()),
        ("source_fs", fs.into()),
        ("b", coefficients.b.clone().into()),
        ("a", coefficients.a.clone().into()),
        ("chunk_overlap", overlap.into()),
        ("chunk_samples", plan.chunk_samples.into()),
        ("ftype", "butter".into()),
        ("btype", "lowpass".into()),
        ("order", params.filter_order.into()),
    ];
    for (key, value) in attrs {
        sink.set_attr(&path, key, value)?;
    }
    sink.set_attr(&path, "freq_lowpass", AttrValue::Float(out_fs / 2.0))?;
    info!(q, fs, out_fs, overlap, chunks = plan.n_chunks(), "decimating");

    let mut samples_processed = 0usize;
    let mut emitted = 0usize;
    let mut discarded = 0usize;
    let mut aborted = false;

    for chunk in ChunkReader::new(source, plan, channels.clone()) {
        let chunk = chunk?;
        let core = chunk.local_core();
        let n_out = core.len() / q;
        let mut values = Vec::with_capacity(channels.len() * n_out);
        for row in chunk.block.channels() {
            let x: Vec<f64> = row.iter().map(|&v| v as f64).collect();
            let y = coefficients.filtfilt(&x)?;
            values.extend((0..n_out).map(|j| y[core.start + j * q] as f32));
        }
        if n_out > 0 {
            sink.append(&path, &ArrayData::F32(values))?;
        }
        emitted += n_out;
        discarded += core.len() - n_out * q;
        samples_processed = chunk.core.end;

        let message = format!("{emitted} samples decimated");
        if progress.report(samples_processed, total, &message).is_break() {
            warn!(samples_processed, "decimation cancelled");
            aborted = true;
            break;
        }
    }

    if discarded > 0 {
        warn!(discarded, "trailing samples shorter than one decimation step");
    }
    sink.set_attr(&path, "samples_discarded", discarded.into())?;
    sink.set_attr(&path, "aborted", aborted.into())?;
    sink.set_attr(&path, "samples_processed", samples_processed.into())?;

    if params.include_block_data {
        if let Some(block) = block_data {
            copy_block_data(block, sink, output)?;
        }
    }
    info!(emitted, aborted, "decimation finished");
    Ok(Completion::new(aborted, samples_processed, total))
}
