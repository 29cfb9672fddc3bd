//! Threshold-crossing spike extraction.
//!
//! One invocation moves through [`ExtractionState`]: parameters are checked
//! and output nodes created while `Initializing`, the recording is scanned
//! chunk by chunk while `Streaming`, and artifact flags, covariance and
//! timestamps are derived from what was collected while `Finalizing`.
//! Finalizing also runs after a cancellation, on the partial result.
//!
//! ## Events
//!
//! A crossing at sample `t` means `signed[t - 1] <= threshold` and
//! `signed[t] > threshold`, where `signed` is the channel multiplied by the
//! sign of its threshold. Only `t` inside a chunk core is tested, so a
//! crossing is found exactly once. The snippet spans
//! `[t - samples_before, t + samples_after)` across every extracted channel;
//! crossings whose snippet would leave the recording are counted as
//! `edge_skipped` and not stored.
//!
//! ## Output layout
//!
//! ```text
//! <output>/event_data/waveforms          f32 (event, channel, sample)
//! <output>/event_data/timestamps_n       i64 (event), first sample above threshold
//! <output>/event_data/timestamps         f64 (event), seconds
//! <output>/event_data/channels           i16 (event), one-based
//! <output>/event_data/channel_indices    i16 (event), slot in the subset
//! <output>/event_data/artifacts          i8  (event, channel)
//! <output>/event_data/covariance_matrix  f64 (d, d), d = channels * window
//! <output>/event_data/covariance_data    f32 (snippet, d)
//! <output>/filter                        processing provenance
//! <output>/block_data                    copied trial data
//! ```

use crate::provenance::{
    copy_block_data, stamp_source, write_parameters, BlockData, ExtractionStamp,
};
use crate::rms::resolve_channels;
use crate::{Error, Result};
use ephys_core::store::join;
use ephys_core::{
    ArrayData, AttrValue, ChunkConfig, ChunkReader, ChunkRequest, Completion, Dtype, Progress,
    Recording, Store,
};
use ephys_dsp::covariance;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

pub const EVENT_DATA: &str = "event_data";
pub const FILTER: &str = "filter";

/// Lifecycle of one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Initializing,
    Streaming,
    Finalizing,
    Done,
    Aborted,
}

fn enter(state: &mut ExtractionState, next: ExtractionState) {
    debug!(from = ?*state, to = ?next, "extraction state");
    *state = next;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractParams {
    /// Zero-based channels; `None` extracts every channel.
    pub channels: Option<Vec<usize>>,
    /// Noise standard deviation per extracted channel.
    pub noise_std: Vec<f64>,
    /// Detection threshold in multiples of `noise_std`, one value for all
    /// channels or one per channel. Negative values detect downward
    /// crossings.
    pub threshold_stds: Vec<f64>,
    /// Artifact threshold in multiples of `noise_std`, broadcast like
    /// `threshold_stds`.
    pub reject_threshold_stds: Vec<f64>,
    pub window_ms: f64,
    /// Time before the crossing included in the snippet.
    pub cross_ms: f64,
    /// Random snippets drawn for the noise covariance.
    pub covariance_samples: usize,
    /// Seed for the covariance draw; a fresh seed is drawn and recorded
    /// when `None`.
    pub covariance_seed: Option<u64>,
    pub include_block_data: bool,
}

impl ExtractParams {
    pub fn new(
        noise_std: Vec<f64>,
        threshold_stds: Vec<f64>,
        reject_threshold_stds: Vec<f64>,
    ) -> Self {
        Self {
            channels: None,
            noise_std,
            threshold_stds,
            reject_threshold_stds,
            window_ms: 2.1,
            cross_ms: 0.5,
            covariance_samples: 10_000,
            covariance_seed: None,
            include_block_data: true,
        }
    }

    /// Snippet geometry at `fs`.
    pub fn geometry(&self, fs: f64) -> Result<WindowGeometry> {
        if !(self.window_ms.is_finite() && self.window_ms > 0.0) {
            return Err(Error::Configuration(format!(
                "window of {} ms is not positive",
                self.window_ms
            )));
        }
        if !(self.cross_ms.is_finite() && self.cross_ms >= 0.0) {
            return Err(Error::Configuration(format!(
                "cross time of {} ms is negative",
                self.cross_ms
            )));
        }
        let window = (self.window_ms * fs * 1e-3).ceil() as usize;
        let before = (self.cross_ms * fs * 1e-3).ceil() as usize;
        if before >= window {
            return Err(Error::Configuration(format!(
                "cross time ({before} samples) leaves no samples after the crossing in a \
                 {window} sample window"
            )));
        }
        Ok(WindowGeometry {
            window,
            before,
            after: window - before,
        })
    }
}

/// Snippet length and its split around the crossing, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub window: usize,
    pub before: usize,
    pub after: usize,
}

fn per_channel(values: &[f64], n: usize, name: &str) -> Result<Vec<f64>> {
    match values.len() {
        1 => Ok(vec![values[0]; n]),
        len if len == n => Ok(values.to_vec()),
        len => Err(Error::Configuration(format!(
            "{name} has {len} values for {n} channels"
        ))),
    }
}

/// Sorted snippet start indices drawn uniformly from `[0, total - window)`.
fn covariance_indices(total: usize, window: usize, count: usize, seed: u64) -> Vec<usize> {
    let Some(upper) = total.checked_sub(window).filter(|&u| u > 0) else {
        return Vec::new();
    };
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..count).map(|_| rng.gen_range(0..upper)).collect();
    indices.sort_unstable();
    indices
}

fn is_artifact(snippet: &[f32], reject: f64) -> bool {
    snippet.iter().any(|&v| {
        let v = v as f64;
        v >= reject || v < -reject
    })
}

/// Extract threshold crossings of `source` into `<output>`.
///
/// Every run stamps a fresh `extract_uuid` and `last_extracted` on the
/// output root. A cancelled run is still finalized and marked `aborted`.
pub fn extract_spikes(
    source: &dyn Recording,
    sink: &mut dyn Store,
    output: &str,
    params: &ExtractParams,
    chunk: &ChunkConfig,
    block_data: Option<BlockData<'_>>,
    progress: &mut dyn Progress,
) -> Result<Completion> {
    let mut state = ExtractionState::Initializing;
    let started = Instant::now();

    chunk.validate()?;
    let fs = source.fs();
    let channels = resolve_channels(source, params.channels.as_deref())?;
    let n_ch = channels.len();
    if channels.iter().any(|&c| c >= i16::MAX as usize) {
        return Err(Error::Configuration(
            "channel numbers must fit in 16 bits".to_string(),
        ));
    }
    let geometry = params.geometry(fs)?;
    let WindowGeometry {
        window,
        before,
        after,
    } = geometry;
    let noise = per_channel(&params.noise_std, n_ch, "noise_std")?;
    let threshold_stds = per_channel(&params.threshold_stds, n_ch, "threshold_stds")?;
    let reject_stds = per_channel(&params.reject_threshold_stds, n_ch, "reject_threshold_stds")?;
    let thresholds: Vec<f64> = noise.iter().zip(&threshold_stds).map(|(n, t)| n * t).collect();
    let reject: Vec<f64> = noise.iter().zip(&reject_stds).map(|(n, r)| n * r).collect();
    let signs: Vec<f64> = thresholds
        .iter()
        .map(|&t| if t < 0.0 { -1.0 } else { 1.0 })
        .collect();
    let levels: Vec<f64> = thresholds.iter().map(|t| t.abs()).collect();

    let total = source.n_samples();
    let plan = ChunkRequest::new(total, n_ch, source.item_size())
        .with_overlap(before.max(1), after)
        .with_read_overhead(source.read_overhead(&channels))
        .plan(chunk.memory_budget_bytes)?;

    let seed = params.covariance_seed.unwrap_or_else(rand::random);
    let cov_indices = covariance_indices(total, window, params.covariance_samples, seed);
    if cov_indices.len() < params.covariance_samples {
        warn!(total, window, "recording too short for covariance snippets");
    }

    let event = join(output, EVENT_DATA);
    let waveforms = join(&event, "waveforms");
    let timestamps_n = join(&event, "timestamps_n");
    let channels_path = join(&event, "channels");
    let channel_indices = join(&event, "channel_indices");
    let artifacts = join(&event, "artifacts");
    let filter = join(output, FILTER);

    sink.get_or_create_group(output)?;
    stamp_source(sink, output, source)?;
    ExtractionStamp::now().write(sink, output)?;
    sink.create_group(&event)?;
    sink.create_array(&waveforms, &[0, n_ch, window], Dtype::F32, 0)?;
    sink.set_attr(&waveforms, "fs", fs.into())?;
    sink.create_array(&timestamps_n, &[0], Dtype::I64, 0)?;
    sink.set_attr(&timestamps_n, "fs", fs.into())?;
    sink.create_array(&channels_path, &[0], Dtype::I16, 0)?;
    sink.create_array(&channel_indices, &[0], Dtype::I16, 0)?;
    sink.create_array(&artifacts, &[0, n_ch], Dtype::I8, 0)?;

    write_parameters(sink, &event, params)?;
    let one_based: Vec<i64> = channels.iter().map(|&c| c as i64 + 1).collect();
    let attrs: [(&str, AttrValue); 15] = [
        ("extracted_channels", one_based.into()),
        ("noise_std", noise.clone().into()),
        ("chunk_samples", plan.chunk_samples.into()),
        ("chunk_left_overlap", plan.left_overlap.into()),
        ("chunk_right_overlap", plan.right_overlap.into()),
        ("window_size", params.window_ms.into()),
        ("cross_time", params.cross_ms.into()),
        ("samples_before", before.into()),
        ("samples_after", after.into()),
        ("window_samples", window.into()),
        ("threshold", thresholds.clone().into()),
        ("reject_threshold", reject.clone().into()),
        ("threshold_std", threshold_stds.into()),
        ("reject_threshold_std", reject_stds.into()),
        ("covariance_seed", seed.to_string().into()),
    ];
    for (key, value) in attrs {
        sink.set_attr(&event, key, value)?;
    }
    sink.create_group(&filter)?;
    source.write_provenance(sink, &filter)?;
    info!(
        channels = n_ch,
        window,
        before,
        chunks = plan.n_chunks(),
        "extracting spikes"
    );

    enter(&mut state, ExtractionState::Streaming);
    let row = n_ch * window;
    let mut cov_data: Vec<f32> = Vec::with_capacity(cov_indices.len() * row);
    let mut cov_next = 0usize;
    let mut n_events = 0usize;
    let mut edge_skipped = 0usize;
    let mut samples_processed = 0usize;
    let mut aborted = false;

    for chunk in ChunkReader::new(source, plan, channels.clone()) {
        let chunk = chunk?;
        let origin = chunk.read.start;
        let rows: Vec<&[f32]> = chunk.block.channels().collect();

        let mut snippets = Vec::new();
        let mut stamps = Vec::new();
        let mut event_channels = Vec::new();
        let mut slots = Vec::new();
        for t in chunk.core.clone().filter(|&t| t > 0) {
            let local = t - origin;
            for (slot, samples) in rows.iter().enumerate() {
                let prev = samples[local - 1] as f64 * signs[slot];
                let cur = samples[local] as f64 * signs[slot];
                if !(prev <= levels[slot] && cur > levels[slot]) {
                    continue;
                }
                let Some(start) = t.checked_sub(before).filter(|&s| s + window <= total) else {
                    edge_skipped += 1;
                    continue;
                };
                let offset = start - origin;
                for channel in &rows {
                    snippets.extend_from_slice(&channel[offset..offset + window]);
                }
                stamps.push(t as i64);
                event_channels.push((channels[slot] + 1) as i16);
                slots.push(slot as i16);
            }
        }
        if !stamps.is_empty() {
            sink.append(&waveforms, &ArrayData::F32(snippets))?;
            n_events += stamps.len();
            sink.append(&timestamps_n, &ArrayData::I64(stamps))?;
            sink.append(&channels_path, &ArrayData::I16(event_channels))?;
            sink.append(&channel_indices, &ArrayData::I16(slots))?;
        }

        while let Some(&index) = cov_indices.get(cov_next) {
            if index >= chunk.core.end || index + window > chunk.read.end {
                break;
            }
            let offset = index - origin;
            for channel in &rows {
                cov_data.extend_from_slice(&channel[offset..offset + window]);
            }
            cov_next += 1;
        }

        samples_processed = chunk.core.end;
        let message = format!("Found {n_events} features");
        if progress.report(samples_processed, total, &message).is_break() {
            warn!(samples_processed, n_events, "extraction cancelled");
            aborted = true;
            break;
        }
    }

    enter(&mut state, ExtractionState::Finalizing);
    sink.set_attr(output, "aborted", aborted.into())?;
    sink.set_attr(output, "last_processed_sample", samples_processed.into())?;
    sink.set_attr(&event, "edge_skipped", edge_skipped.into())?;
    if edge_skipped > 0 {
        warn!(edge_skipped, "crossings too close to the recording edge");
    }

    let batch = (chunk.memory_budget_bytes / (row * 4).max(1)).max(1);
    let mut start = 0;
    while start < n_events {
        let end = (start + batch).min(n_events);
        let block = sink.read_rows(&waveforms, start, end)?.into_f32(&waveforms)?;
        let flags: Vec<i8> = block
            .chunks_exact(window)
            .zip(reject.iter().cycle())
            .map(|(snippet, &rej)| is_artifact(snippet, rej) as i8)
            .collect();
        sink.append(&artifacts, &ArrayData::I8(flags))?;
        start = end;
    }

    let n_cov = cov_next;
    let cov_matrix = covariance(&cov_data, n_cov, row);
    sink.put_array(
        &join(&event, "covariance_matrix"),
        &[row, row],
        &ArrayData::F64(cov_matrix),
    )?;
    sink.put_array(
        &join(&event, "covariance_data"),
        &[n_cov, row],
        &ArrayData::F32(cov_data),
    )?;
    sink.set_attr(&event, "covariance_collected", n_cov.into())?;

    let seconds: Vec<f64> = sink
        .read(&timestamps_n)?
        .into_i64(&timestamps_n)?
        .into_iter()
        .map(|n| n as f64 / fs)
        .collect();
    sink.put_array(
        &join(&event, "timestamps"),
        &[seconds.len()],
        &ArrayData::F64(seconds),
    )?;

    if params.include_block_data {
        if let Some(block) = block_data {
            copy_block_data(block, sink, output)?;
        }
    }

    let _ = progress.report(samples_processed, total, "Complete");
    enter(
        &mut state,
        if aborted {
            ExtractionState::Aborted
        } else {
            ExtractionState::Done
        },
    );
    info!(
        n_events,
        covariance_snippets = n_cov,
        aborted,
        elapsed_s = started.elapsed().as_secs_f64(),
        "spike extraction finished"
    );
    Ok(Completion::new(aborted, samples_processed, total))
}
