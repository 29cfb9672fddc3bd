//! Morlet wavelet spectrogram of a decimated recording.
//!
//! The output is a dense complex `(channel, frequency, sample)` array sized
//! to the whole source. Each chunk carries the longest kernel's length of
//! overlap on both sides, so the centered convolution over the core never
//! sees a chunk edge.

use crate::provenance::{copy_block_data, stamp_source, write_parameters, BlockData};
use crate::{Error, Result};
use ephys_core::recording::all_channels;
use ephys_core::store::join;
use ephys_core::{
    ArrayData, AttrValue, ChunkConfig, ChunkReader, ChunkRequest, Completion, Complex32, Dtype,
    Progress, Recording, Store,
};
use ephys_dsp::{Complex64, FftConvolver, MorletBank};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const SPECTROGRAM_ARRAY: &str = "spectrogram";
pub const WAVELETS: &str = "wavelets";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrogramParams {
    /// Centre frequencies in Hz.
    pub frequencies: Vec<f64>,
    pub cycles: f64,
    pub include_block_data: bool,
}

impl SpectrogramParams {
    pub fn new(frequencies: Vec<f64>) -> Self {
        Self {
            frequencies,
            cycles: 3.0,
            include_block_data: true,
        }
    }

    pub fn bank(&self, fs: f64) -> Result<MorletBank> {
        Ok(MorletBank::new(fs, &self.frequencies, self.cycles)?)
    }
}

/// Compute the spectrogram of `source` into `<output>/spectrogram`.
///
/// Samples beyond an early cancellation stay zero in the output.
pub fn spectrogram(
    source: &dyn Recording,
    sink: &mut dyn Store,
    output: &str,
    params: &SpectrogramParams,
    chunk: &ChunkConfig,
    block_data: Option<BlockData<'_>>,
    progress: &mut dyn Progress,
) -> Result<Completion> {
    chunk.validate()?;
    let fs = source.fs();
    let bank = params.bank(fs)?;
    let n_freqs = bank.frequencies.len();
    let overlap = bank.max_len();
    let channels = all_channels(source);
    let total = source.n_samples();
    if total == 0 {
        return Err(Error::Configuration("source has no samples".to_string()));
    }
    // input sample plus one double-precision response per frequency
    let item_size = source.item_size() + std::mem::size_of::<Complex64>() * n_freqs;
    let plan = ChunkRequest::new(total, channels.len(), item_size)
        .with_overlap(overlap, overlap)
        .with_read_overhead(source.read_overhead(&channels))
        .plan(chunk.memory_budget_bytes)?;

    let path = join(output, SPECTROGRAM_ARRAY);
    sink.get_or_create_group(output)?;
    sink.create_dense(&path, &[channels.len(), n_freqs, total], Dtype::C64)?;
    stamp_source(sink, output, source)?;
    write_parameters(sink, &path, params)?;
    let lengths: Vec<usize> = bank.kernels.iter().map(Vec::len).collect();
    let attrs: [(&str, AttrValue); 6] = [
        ("fs", fs.into()),
        ("chunk_overlap", overlap.into()),
        ("chunk_samples", plan.chunk_samples.into()),
        ("frequencies", bank.frequencies.clone().into()),
        ("wavelet_cycles", params.cycles.into()),
        ("wavelet_lengths", lengths.as_slice().into()),
    ];
    for (key, value) in attrs {
        sink.set_attr(&path, key, value)?;
    }
    let wavelets = join(output, WAVELETS);
    sink.create_group(&wavelets)?;
    for (j, (kernel, &freq)) in bank.kernels.iter().zip(&bank.frequencies).enumerate() {
        let kernel_path = join(&wavelets, &j.to_string());
        let data: Vec<Complex32> = kernel
            .iter()
            .map(|c| Complex32::new(c.re as f32, c.im as f32))
            .collect();
        sink.put_array(&kernel_path, &[data.len()], &ArrayData::C64(data))?;
        sink.set_attr(&kernel_path, "frequency", freq.into())?;
    }
    info!(
        frequencies = n_freqs,
        overlap,
        chunks = plan.n_chunks(),
        "computing spectrogram"
    );

    let mut convolver = FftConvolver::new(bank.kernels);
    let mut samples_processed = 0usize;
    let mut aborted = false;

    for chunk in ChunkReader::new(source, plan, channels.clone()) {
        let chunk = chunk?;
        let core = chunk.local_core();
        for (c, row) in chunk.block.channels().enumerate() {
            for (j, response) in convolver.convolve_same(row).into_iter().enumerate() {
                let lane: Vec<Complex32> = response[core.clone()]
                    .iter()
                    .map(|v| Complex32::new(v.re as f32, v.im as f32))
                    .collect();
                sink.write_lane(&path, &[c, j], chunk.core.start, &ArrayData::C64(lane))?;
            }
        }
        samples_processed = chunk.core.end;
        if progress.report(samples_processed, total, "").is_break() {
            warn!(samples_processed, "spectrogram cancelled");
            aborted = true;
            break;
        }
    }

    sink.set_attr(&path, "aborted", aborted.into())?;
    sink.set_attr(&path, "samples_processed", samples_processed.into())?;
    if params.include_block_data {
        if let Some(block) = block_data {
            copy_block_data(block, sink, output)?;
        }
    }
    info!(aborted, samples_processed, "spectrogram finished");
    Ok(Completion::new(aborted, samples_processed, total))
}
