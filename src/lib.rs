//! # ephys - Out-of-core physiology analysis
//!
//! Chunked processing of multi-gigabyte, multi-channel recordings with
//! sample-accurate continuity across chunk boundaries.
//!
//! ## Architecture
//!
//! ephys is an umbrella crate that coordinates:
//! - **ephys-core** - Chunk planning and reading, strided windows, stores, recordings, progress
//! - **ephys-dsp** - Butterworth design, zero-phase filtering, Morlet wavelets, robust statistics
//! - **ephys-analysis** - RMS, decimation, spike extraction and spectrogram engines
//!
//! ## Quick Start
//!
//! ```
//! use ephys::prelude::*;
//!
//! // A one second, two channel recording at 1 kHz
//! let rec = MemoryRecording::from_channels(&[vec![0.5; 1000], vec![-0.5; 1000]], 1000.0)?;
//! let mut sink = MemoryStore::new("derived.store");
//!
//! let analyzer = Analyzer::builder().memory_budget(1_000_000).build()?;
//! let params = RmsParams {
//!     window_duration_s: 0.1,
//!     window_step_s: 0.05,
//!     ..Default::default()
//! };
//! analyzer.running_rms(&rec, &mut sink, "noise", &params, &mut NoProgress)?;
//!
//! assert_eq!(sink.shape("noise/rms")?, vec![2, 19]);
//! # Ok::<(), ephys::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Library plus CLI
//! - `cli` - The `ephys-decimate` binary

/// Re-export of ephys-core for direct access
pub use ephys_core as core;

/// Re-export of ephys-dsp for direct access
pub use ephys_dsp as dsp;

/// Re-export of ephys-analysis for direct access
pub use ephys_analysis as analysis;

// Core types
pub use ephys_core::{
    Block,
    CancelToken,
    // Chunking
    Chunk,
    ChunkConfig,
    ChunkPlan,
    ChunkReader,
    ChunkRequest,
    // Progress
    Completion,
    CompletionStatus,
    DirStore,
    MemoryRecording,
    // Stores
    MemoryStore,
    NoProgress,
    Progress,
    // Recordings
    Recording,
    Store,
    StoreRecording,
    StridedWindows,
    DEFAULT_MEMORY_BUDGET,
};

// Engines
pub use ephys_analysis::{
    decimate, estimate_noise, extract_spikes, running_rms, spectrogram, BlockData,
    DecimateParams, ExtractParams, ProcessedRecording, ProcessingConfig, RmsEstimator, RmsParams,
    SpectrogramParams,
};

// Filter design
pub use ephys_dsp::{BandType, FilterCoefficients, ReferenceMode};

mod builder;
mod engine;
mod error;

pub use builder::AnalyzerBuilder;
pub use engine::Analyzer;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    // Main analyzer
    pub use crate::{Analyzer, AnalyzerBuilder};

    // Sources and sinks
    pub use crate::core::{
        AttrValue, DirStore, MemoryRecording, MemoryStore, Recording, Store, StoreRecording,
    };

    // Progress
    pub use crate::core::{CancelToken, Completion, CompletionStatus, NoProgress, Progress};

    // Parameter bundles
    pub use crate::analysis::{
        DecimateParams, ExtractParams, ProcessingConfig, RmsEstimator, RmsParams,
        SpectrogramParams,
    };
    pub use crate::core::ChunkConfig;
    pub use crate::dsp::{BandType, ReferenceMode};
}
