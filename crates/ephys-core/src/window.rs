//! Strided sliding windows over a block, without copying.
//!
//! The view has shape `(channels, n_windows, window_samples)` with strides
//! `(channel_stride, step, 1)` into the block's channel-major buffer.

use crate::block::Block;
use crate::{Error, Result};

/// Read-only windowed view of a [`Block`].
#[derive(Debug, Clone, Copy)]
pub struct StridedWindows<'a> {
    data: &'a [f32],
    n_channels: usize,
    n_samples: usize,
    window_samples: usize,
    step: usize,
    n_windows: usize,
}

impl<'a> StridedWindows<'a> {
    pub fn new(block: &'a Block, window_samples: usize, step: usize) -> Result<Self> {
        if window_samples == 0 || step == 0 {
            return Err(Error::config(format!(
                "window ({window_samples}) and step ({step}) must be positive"
            )));
        }
        let n_samples = block.n_samples();
        let n_windows = if n_samples >= window_samples {
            (n_samples - window_samples) / step + 1
        } else {
            0
        };
        Ok(Self {
            data: block.as_slice(),
            n_channels: block.n_channels(),
            n_samples,
            window_samples,
            step,
            n_windows,
        })
    }

    /// `(channels, n_windows, window_samples)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_channels, self.n_windows, self.window_samples)
    }

    /// Element strides for each axis of [`shape`](Self::shape).
    pub fn strides(&self) -> (usize, usize, usize) {
        (self.n_samples, self.step, 1)
    }

    pub fn n_windows(&self) -> usize {
        self.n_windows
    }

    /// Trailing samples not covered by any window.
    pub fn leftover(&self) -> usize {
        if self.n_windows == 0 {
            self.n_samples
        } else {
            self.n_samples - ((self.n_windows - 1) * self.step + self.window_samples)
        }
    }

    /// Window `index` of `channel`.
    pub fn window(&self, channel: usize, index: usize) -> &'a [f32] {
        let (channel_stride, window_stride, _) = self.strides();
        let start = channel * channel_stride + index * window_stride;
        &self.data[start..start + self.window_samples]
    }

    /// All windows of one channel in order.
    pub fn windows(&self, channel: usize) -> impl Iterator<Item = &'a [f32]> + '_ {
        (0..self.n_windows).map(move |i| self.window(channel, i))
    }
}
