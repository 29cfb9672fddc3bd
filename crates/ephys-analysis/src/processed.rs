//! Referenced and filtered view of a recording.
//!
//! Reads fetch `padding` extra samples on each side (clamped at the
//! recording edges), apply the referencing matrix, filter zero-phase and
//! trim back to the requested range.

use crate::{Error, Result};
use ephys_core::recording::check_read;
use ephys_core::{AttrValue, Block, ReadOverhead, Recording, SourceInfo, Store};
use ephys_dsp::{apply_reference, diff_matrix, Band, BandType, FilterCoefficients, ReferenceMode};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Referencing and filtering applied to raw channels before analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub lowpass_hz: Option<f64>,
    pub highpass_hz: Option<f64>,
    pub filter_order: usize,
    pub band_type: BandType,
    /// Zero-based bad channels; `None` uses the recording's own flags.
    pub bad_channels: Option<Vec<usize>>,
    pub reference: ReferenceMode,
    /// Extra samples read on each side; `None` means `3 * n_taps`.
    pub padding: Option<usize>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            lowpass_hz: Some(6000.0),
            highpass_hz: Some(300.0),
            filter_order: 8,
            band_type: BandType::Bandpass,
            bad_channels: None,
            reference: ReferenceMode::None,
            padding: None,
        }
    }
}

impl ProcessingConfig {
    /// Check the configuration against a sampling rate and design the filter.
    pub fn design(&self, fs: f64) -> Result<FilterCoefficients> {
        if self.filter_order == 0 {
            return Err(Error::Configuration(
                "filter_order must be at least 1".to_string(),
            ));
        }
        let band = Band::from_hz(self.band_type, self.lowpass_hz, self.highpass_hz, fs)?;
        Ok(FilterCoefficients::butterworth(self.filter_order, band)?)
    }

    pub fn validate(&self, fs: f64) -> Result<()> {
        self.design(fs).map(|_| ())
    }
}

/// A recording seen through a [`ProcessingConfig`].
pub struct ProcessedRecording<'a> {
    inner: &'a dyn Recording,
    config: ProcessingConfig,
    coefficients: FilterCoefficients,
    bad_channels: Vec<usize>,
    diff: Vec<f64>,
    padding: usize,
}

impl<'a> ProcessedRecording<'a> {
    pub fn new(inner: &'a dyn Recording, config: ProcessingConfig) -> Result<Self> {
        let coefficients = config.design(inner.fs())?;
        let n = inner.n_channels();
        let bad_channels = config
            .bad_channels
            .clone()
            .unwrap_or_else(|| inner.bad_channels());
        if let Some(&bad) = bad_channels.iter().find(|&&c| c >= n) {
            return Err(Error::Configuration(format!(
                "bad channel {bad} out of range for {n} channels"
            )));
        }
        let diff = diff_matrix(n, &bad_channels, config.reference);
        let padding = config.padding.unwrap_or(3 * coefficients.n_taps());
        Ok(Self {
            inner,
            config,
            coefficients,
            bad_channels,
            diff,
            padding,
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn filter_coefficients(&self) -> &FilterCoefficients {
        &self.coefficients
    }

    /// Row-major `n x n` referencing matrix.
    pub fn diff_matrix(&self) -> &[f64] {
        &self.diff
    }

    pub fn padding(&self) -> usize {
        self.padding
    }
}

impl Recording for ProcessedRecording<'_> {
    fn n_channels(&self) -> usize {
        self.inner.n_channels()
    }

    fn n_samples(&self) -> usize {
        self.inner.n_samples()
    }

    fn fs(&self) -> f64 {
        self.inner.fs()
    }

    fn bad_channels(&self) -> Vec<usize> {
        self.bad_channels.clone()
    }

    fn item_size(&self) -> usize {
        self.inner.item_size()
    }

    /// The padded raw read, the referenced copy and one row of f64 filter
    /// scratch. Common-average referencing stages every channel.
    fn read_overhead(&self, channels: &[usize]) -> ReadOverhead {
        let item = self.inner.item_size();
        let (inner, staged) = match self.config.reference {
            ReferenceMode::None => (self.inner.read_overhead(channels), channels.len()),
            ReferenceMode::AllGood => {
                let all: Vec<usize> = (0..self.n_channels()).collect();
                (self.inner.read_overhead(&all), all.len() + channels.len())
            }
        };
        ReadOverhead {
            bytes_per_sample: inner.bytes_per_sample
                + staged * item
                + 2 * std::mem::size_of::<f64>(),
            margin: inner.margin + self.padding,
        }
    }

    fn read(&self, range: Range<usize>, channels: &[usize]) -> ephys_core::Result<Block> {
        let n_samples = self.n_samples();
        check_read(&range, channels, n_samples, self.n_channels())?;
        let padded = range.start.saturating_sub(self.padding)
            ..(range.end + self.padding).min(n_samples);
        let width = padded.len();

        let referenced = match self.config.reference {
            ReferenceMode::None => self.inner.read(padded.clone(), channels)?.into_vec(),
            ReferenceMode::AllGood => {
                let all: Vec<usize> = (0..self.n_channels()).collect();
                let raw = self.inner.read(padded.clone(), &all)?;
                apply_reference(&self.diff, raw.as_slice(), width, channels)
            }
        };

        let trim = range.start - padded.start;
        let mut data = Vec::with_capacity(channels.len() * range.len());
        for row in referenced.chunks_exact(width.max(1)) {
            let x: Vec<f64> = row.iter().map(|&v| v as f64).collect();
            let y = self
                .coefficients
                .filtfilt(&x)
                .map_err(|e| ephys_core::Error::Configuration(e.to_string()))?;
            data.extend(y[trim..trim + range.len()].iter().map(|&v| v as f32));
        }
        Block::from_vec(channels.len(), range.len(), data).ok_or_else(|| {
            ephys_core::Error::Configuration("processed block has the wrong shape".to_string())
        })
    }

    fn source(&self) -> SourceInfo {
        self.inner.source()
    }

    /// Filter cutoffs, coefficients, referencing matrix and bad channels
    /// (one-based) as attributes of `path`.
    fn write_provenance(&self, store: &mut dyn Store, path: &str) -> ephys_core::Result<()> {
        let c = &self.config;
        if let Some(lp) = c.lowpass_hz {
            store.set_attr(path, "fc_lowpass", AttrValue::Float(lp))?;
        }
        if let Some(hp) = c.highpass_hz {
            store.set_attr(path, "fc_highpass", AttrValue::Float(hp))?;
        }
        store.set_attr(path, "filter_order", c.filter_order.into())?;
        store.set_attr(path, "filter_btype", c.band_type.as_str().into())?;
        store.set_attr(path, "filter_padding", self.padding.into())?;
        store.set_attr(path, "diff_mode", c.reference.as_str().into())?;
        store.set_attr(path, "differential", self.diff.clone().into())?;
        let n = self.n_channels();
        store.set_attr(path, "differential_shape", AttrValue::IntArray(vec![n as i64, n as i64]))?;
        store.set_attr(
            path,
            "bad_channels",
            AttrValue::IntArray(self.bad_channels.iter().map(|&c| c as i64 + 1).collect()),
        )?;
        store.set_attr(path, "b_coefficients", self.coefficients.b.clone().into())?;
        store.set_attr(path, "a_coefficients", self.coefficients.a.clone().into())?;
        Ok(())
    }
}
