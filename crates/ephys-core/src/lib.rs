//! # ephys-core
//!
//! Chunked, out-of-core access to multi-channel physiology recordings.
//!
//! ## Features
//!
//! - **Chunk planning**: aligned core lengths from a memory budget and overlaps
//! - **Chunk reading**: single forward pass, every sample in exactly one core
//! - **Strided windows**: zero-copy `(channels, windows, samples)` views
//! - **Store**: hierarchical arrays and attributes, in memory or on disk
//! - **Progress**: per-chunk reporting with cooperative cancellation

pub mod block;
pub mod chunk;
pub mod config;
pub mod error;
pub mod progress;
pub mod recording;
pub mod store;
pub mod window;

pub use block::Block;
pub use chunk::{Chunk, ChunkPlan, ChunkReader, ChunkRequest};
pub use config::{ChunkConfig, DEFAULT_MEMORY_BUDGET};
pub use error::{Error, Result};
pub use progress::{CancelToken, Completion, CompletionStatus, NoProgress, Progress};
pub use recording::{MemoryRecording, ReadOverhead, Recording, SourceInfo, StoreRecording};
pub use store::{ArrayData, ArrayInfo, AttrValue, DirStore, Dtype, MemoryStore, NodeKind, Store};
pub use window::StridedWindows;

pub use num_complex::Complex32;
