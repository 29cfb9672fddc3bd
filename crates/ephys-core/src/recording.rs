//! Read-only multi-channel recordings.

use crate::block::Block;
use crate::store::{basename, ArrayData, AttrValue, Dtype, Store};
use crate::{Error, Result};
use std::ops::Range;

/// Where a recording came from, written to derived outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    /// File or store the recording lives in.
    pub file: String,
    /// Node path inside that file.
    pub path: String,
}

/// A `(channels, samples)` waveform with a sampling rate.
pub trait Recording {
    fn n_channels(&self) -> usize;

    fn n_samples(&self) -> usize;

    /// Sampling rate in Hz.
    fn fs(&self) -> f64;

    /// Zero-based indices of channels flagged bad.
    fn bad_channels(&self) -> Vec<usize> {
        Vec::new()
    }

    /// Bytes per sample per channel, used for chunk budgeting.
    fn item_size(&self) -> usize {
        std::mem::size_of::<f32>()
    }

    /// Memory a read of `channels` holds beyond the returned block.
    fn read_overhead(&self, _channels: &[usize]) -> ReadOverhead {
        ReadOverhead::default()
    }

    /// Read `range` on `channels` (zero-based) into a block whose rows
    /// follow the order of `channels`.
    ///
    /// Fails with [`Error::SourceBounds`] if `range` is outside the
    /// recording; never pads.
    fn read(&self, range: Range<usize>, channels: &[usize]) -> Result<Block>;

    fn source(&self) -> SourceInfo {
        SourceInfo::default()
    }

    /// Record upstream processing parameters on `path` in `store`.
    fn write_provenance(&self, _store: &mut dyn Store, _path: &str) -> Result<()> {
        Ok(())
    }
}

/// Transient memory of one read, on top of the block it returns.
///
/// Sources that reference or filter on the fly read more channels and
/// more samples than they hand back; chunk planning charges both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOverhead {
    /// Extra bytes held per sample of the read range.
    pub bytes_per_sample: usize,
    /// Extra samples read on each side of the range.
    pub margin: usize,
}

/// Check a read request against the recording shape.
pub fn check_read(
    range: &Range<usize>,
    channels: &[usize],
    n_samples: usize,
    n_channels: usize,
) -> Result<()> {
    if range.start > range.end || range.end > n_samples {
        return Err(Error::SourceBounds {
            start: range.start,
            end: range.end,
            len: n_samples,
        });
    }
    if let Some(&bad) = channels.iter().find(|&&c| c >= n_channels) {
        return Err(Error::Configuration(format!(
            "channel {bad} out of range for {n_channels} channels"
        )));
    }
    Ok(())
}

/// All channel indices of a recording.
pub fn all_channels(recording: &dyn Recording) -> Vec<usize> {
    (0..recording.n_channels()).collect()
}

/// Recording held in memory.
#[derive(Debug, Clone)]
pub struct MemoryRecording {
    samples: Block,
    fs: f64,
    bad_channels: Vec<usize>,
    name: String,
}

impl MemoryRecording {
    pub fn new(samples: Block, fs: f64) -> Self {
        Self {
            samples,
            fs,
            bad_channels: Vec::new(),
            name: "memory".to_string(),
        }
    }

    pub fn from_channels(channels: &[Vec<f32>], fs: f64) -> Result<Self> {
        let samples = Block::from_channels(channels)
            .ok_or_else(|| Error::config("channels must have equal lengths"))?;
        Ok(Self::new(samples, fs))
    }

    pub fn with_bad_channels(mut self, bad: Vec<usize>) -> Self {
        self.bad_channels = bad;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn samples(&self) -> &Block {
        &self.samples
    }
}

impl Recording for MemoryRecording {
    fn n_channels(&self) -> usize {
        self.samples.n_channels()
    }

    fn n_samples(&self) -> usize {
        self.samples.n_samples()
    }

    fn fs(&self) -> f64 {
        self.fs
    }

    fn bad_channels(&self) -> Vec<usize> {
        self.bad_channels.clone()
    }

    fn read(&self, range: Range<usize>, channels: &[usize]) -> Result<Block> {
        check_read(&range, channels, self.n_samples(), self.n_channels())?;
        let mut data = Vec::with_capacity(channels.len() * range.len());
        for &c in channels {
            data.extend_from_slice(&self.samples.channel(c)[range.clone()]);
        }
        Block::from_vec(channels.len(), range.len(), data)
            .ok_or_else(|| Error::config("block shape mismatch"))
    }

    fn source(&self) -> SourceInfo {
        SourceInfo {
            file: self.name.clone(),
            path: String::new(),
        }
    }
}

/// Recording backed by a `(channels, samples)` f32 array in a store,
/// extensible along samples.
pub struct StoreRecording<'a> {
    store: &'a dyn Store,
    path: String,
    n_channels: usize,
    n_samples: usize,
    fs: f64,
    bad_channels: Vec<usize>,
}

impl<'a> StoreRecording<'a> {
    /// Open the array at `path`, reading its `fs` and optional
    /// `bad_channels` attributes.
    pub fn open(store: &'a dyn Store, path: &str) -> Result<Self> {
        let info = store.info(path)?;
        if info.dtype != Dtype::F32 {
            return Err(Error::DtypeMismatch {
                path: path.to_string(),
                expected: Dtype::F32,
                found: info.dtype,
            });
        }
        if info.shape.len() != 2 || info.extensible_axis != Some(1) {
            return Err(Error::shape(
                path,
                "recordings are (channels, samples) arrays extensible along samples",
            ));
        }
        let fs = store
            .require_attr(path, "fs")?
            .as_f64()
            .ok_or_else(|| Error::config(format!("attribute 'fs' on '{path}' is not numeric")))?;
        let bad_channels = match store.get_attr(path, "bad_channels")? {
            Some(AttrValue::IntArray(v)) => v.iter().map(|&c| c as usize).collect(),
            _ => Vec::new(),
        };
        Ok(Self {
            store,
            path: path.to_string(),
            n_channels: info.shape[0],
            n_samples: info.shape[1],
            fs,
            bad_channels,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Recording for StoreRecording<'_> {
    fn n_channels(&self) -> usize {
        self.n_channels
    }

    fn n_samples(&self) -> usize {
        self.n_samples
    }

    fn fs(&self) -> f64 {
        self.fs
    }

    fn bad_channels(&self) -> Vec<usize> {
        self.bad_channels.clone()
    }

    fn read(&self, range: Range<usize>, channels: &[usize]) -> Result<Block> {
        check_read(&range, channels, self.n_samples, self.n_channels)?;
        let data = match self
            .store
            .read_channels(&self.path, range.start, range.end, channels)?
        {
            ArrayData::F32(v) => v,
            other => {
                return Err(Error::DtypeMismatch {
                    path: self.path.clone(),
                    expected: Dtype::F32,
                    found: other.dtype(),
                })
            }
        };
        let n = range.len();
        Block::from_vec(channels.len(), n, data).ok_or_else(|| Error::shape(&self.path, "short read"))
    }

    fn source(&self) -> SourceInfo {
        SourceInfo {
            file: basename(&self.store.location()).to_string(),
            path: self.path.clone(),
        }
    }
}
