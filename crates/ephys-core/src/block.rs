//! Channel-major sample blocks.

use std::ops::Range;

/// A `(channels, samples)` block of f32 samples, stored channel-major.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    n_channels: usize,
    n_samples: usize,
    data: Vec<f32>,
}

impl Block {
    /// Zero-filled block.
    pub fn zeros(n_channels: usize, n_samples: usize) -> Self {
        Self {
            n_channels,
            n_samples,
            data: vec![0.0; n_channels * n_samples],
        }
    }

    /// Wrap channel-major samples. Returns `None` if the length does not
    /// match the shape.
    pub fn from_vec(n_channels: usize, n_samples: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == n_channels * n_samples).then_some(Self {
            n_channels,
            n_samples,
            data,
        })
    }

    /// Build from per-channel vectors of equal length.
    pub fn from_channels(channels: &[Vec<f32>]) -> Option<Self> {
        let n_samples = channels.first().map_or(0, Vec::len);
        if channels.iter().any(|c| c.len() != n_samples) {
            return None;
        }
        Some(Self {
            n_channels: channels.len(),
            n_samples,
            data: channels.concat(),
        })
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.data[index * self.n_samples..(index + 1) * self.n_samples]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.data[index * self.n_samples..(index + 1) * self.n_samples]
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on zero
        self.data.chunks_exact(self.n_samples.max(1))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Copy of the samples in `range` on every channel.
    pub fn slice(&self, range: Range<usize>) -> Block {
        let mut data = Vec::with_capacity(self.n_channels * range.len());
        for c in 0..self.n_channels {
            data.extend_from_slice(&self.channel(c)[range.clone()]);
        }
        Block {
            n_channels: self.n_channels,
            n_samples: range.len(),
            data,
        }
    }
}
