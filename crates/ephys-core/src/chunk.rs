//! Chunk planning and overlapping chunk reads.
//!
//! A recording is cut into consecutive *cores* of `chunk_samples` samples
//! (the last one may be short). Each read extends its core by
//! `left_overlap` samples before and `right_overlap` samples after,
//! clamped to the recording, so algorithms with memory (filters, windows,
//! snippets) see real neighbouring data at every seam. Cores tile
//! `[0, total_samples)` exactly.

use crate::block::Block;
use crate::recording::{ReadOverhead, Recording};
use crate::{Error, Result};
use std::ops::Range;
use tracing::debug;

/// Inputs to chunk planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    pub total_samples: usize,
    pub n_channels: usize,
    /// Bytes per sample per channel held in memory while a chunk is live.
    pub item_size: usize,
    pub left_overlap: usize,
    pub right_overlap: usize,
    /// Core length must be a multiple of this.
    pub alignment: usize,
    /// What the source holds per read beyond the chunk itself.
    pub read_overhead: ReadOverhead,
}

impl ChunkRequest {
    pub fn new(total_samples: usize, n_channels: usize, item_size: usize) -> Self {
        Self {
            total_samples,
            n_channels,
            item_size,
            left_overlap: 0,
            right_overlap: 0,
            alignment: 1,
            read_overhead: ReadOverhead::default(),
        }
    }

    pub fn with_overlap(mut self, left: usize, right: usize) -> Self {
        self.left_overlap = left;
        self.right_overlap = right;
        self
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_read_overhead(mut self, overhead: ReadOverhead) -> Self {
        self.read_overhead = overhead;
        self
    }

    /// Compute the chunk plan for a memory budget.
    ///
    /// The candidate length `budget / (channels * item_size + overhead)`
    /// pays for the overlaps and the source's read margins first; the
    /// remaining core is rounded down to a multiple of `alignment` and must
    /// exceed `left_overlap + right_overlap`.
    pub fn plan(&self, memory_budget_bytes: usize) -> Result<ChunkPlan> {
        if self.alignment == 0 {
            return Err(Error::config("chunk alignment must be at least 1"));
        }
        if self.n_channels == 0 || self.item_size == 0 {
            return Err(Error::config(format!(
                "cannot plan chunks for {} channels of {} bytes",
                self.n_channels, self.item_size
            )));
        }
        let overlap = self.left_overlap + self.right_overlap;
        let per_sample = self.n_channels * self.item_size + self.read_overhead.bytes_per_sample;
        let budget_samples = memory_budget_bytes / per_sample;
        let core = budget_samples.saturating_sub(overlap + 2 * self.read_overhead.margin)
            / self.alignment
            * self.alignment;
        if core <= overlap || core == 0 {
            return Err(Error::Configuration(format!(
                "memory budget of {memory_budget_bytes} bytes leaves a core of {core} samples \
                 for {} channels; need more than {overlap} (overlap {}+{}, alignment {})",
                self.n_channels, self.left_overlap, self.right_overlap, self.alignment
            )));
        }
        let plan = ChunkPlan {
            chunk_samples: core,
            left_overlap: self.left_overlap,
            right_overlap: self.right_overlap,
            total_samples: self.total_samples,
        };
        debug!(
            chunk_samples = plan.chunk_samples,
            left = plan.left_overlap,
            right = plan.right_overlap,
            n_chunks = plan.n_chunks(),
            "planned chunks"
        );
        Ok(plan)
    }
}

/// Chunk geometry for one pass over a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Core length of every chunk but possibly the last.
    pub chunk_samples: usize,
    pub left_overlap: usize,
    pub right_overlap: usize,
    pub total_samples: usize,
}

impl ChunkPlan {
    pub fn n_chunks(&self) -> usize {
        self.total_samples.div_ceil(self.chunk_samples)
    }

    /// Samples owned by chunk `index`.
    pub fn core_range(&self, index: usize) -> Range<usize> {
        let start = (index * self.chunk_samples).min(self.total_samples);
        let end = (start + self.chunk_samples).min(self.total_samples);
        start..end
    }

    /// Samples read for chunk `index`: the core plus overlaps, clamped to
    /// the recording.
    pub fn read_range(&self, index: usize) -> Range<usize> {
        let core = self.core_range(index);
        let start = core.start.saturating_sub(self.left_overlap);
        let end = (core.end + self.right_overlap).min(self.total_samples);
        start..end
    }

    /// Longest possible read, in samples.
    pub fn max_read_samples(&self) -> usize {
        self.left_overlap + self.chunk_samples + self.right_overlap
    }
}

/// One chunk read from a recording.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    /// Samples owned by this chunk, in recording coordinates.
    pub core: Range<usize>,
    /// Samples held in `block`, in recording coordinates.
    pub read: Range<usize>,
    pub block: Block,
    pub is_last: bool,
}

impl Chunk {
    /// Offset of the core inside `block`.
    pub fn core_offset(&self) -> usize {
        self.core.start - self.read.start
    }

    /// Core range in block coordinates.
    pub fn local_core(&self) -> Range<usize> {
        let offset = self.core_offset();
        offset..offset + self.core.len()
    }
}

/// Single forward pass over the chunks of a plan.
pub struct ChunkReader<'a> {
    recording: &'a dyn Recording,
    plan: ChunkPlan,
    channels: Vec<usize>,
    next: usize,
}

impl<'a> ChunkReader<'a> {
    pub fn new(recording: &'a dyn Recording, plan: ChunkPlan, channels: Vec<usize>) -> Self {
        Self {
            recording,
            plan,
            channels,
            next: 0,
        }
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }
}

impl Iterator for ChunkReader<'_> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let n_chunks = self.plan.n_chunks();
        if self.next >= n_chunks {
            return None;
        }
        let index = self.next;
        let read = self.plan.read_range(index);
        match self.recording.read(read.clone(), &self.channels) {
            Ok(block) => {
                self.next += 1;
                Some(Ok(Chunk {
                    index,
                    core: self.plan.core_range(index),
                    read,
                    block,
                    is_last: index + 1 == n_chunks,
                }))
            }
            Err(e) => {
                self.next = n_chunks;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.plan.n_chunks().saturating_sub(self.next);
        (left, Some(left))
    }
}
