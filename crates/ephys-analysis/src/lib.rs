//! # ephys-analysis
//!
//! Out-of-core engines for multi-channel physiology recordings.
//!
//! Every engine makes one forward pass over a [`Recording`], writes its
//! derived arrays into a [`Store`], reports progress once per chunk and
//! stops cleanly when the progress callback breaks:
//!
//! - **Running RMS**: noise floor over sliding windows ([`running_rms`])
//! - **Decimation**: zero-phase low-pass and downsampling ([`decimate`])
//! - **Spike extraction**: threshold crossings, snippets, artifact flags and
//!   noise covariance ([`extract_spikes`])
//! - **Spectrogram**: complex Morlet decomposition ([`spectrogram`])
//!
//! Raw channels are referenced and filtered through [`ProcessedRecording`].
//! In-place edits of acquired data live apart in [`destructive`].
//!
//! ## Example
//!
//! ```rust
//! use ephys_analysis::{running_rms, RmsParams};
//! use ephys_core::{ChunkConfig, MemoryRecording, MemoryStore, NoProgress, Store};
//!
//! let rec = MemoryRecording::from_channels(&[vec![1.0; 4000]], 1000.0)?;
//! let mut sink = MemoryStore::new("noise.store");
//! let done = running_rms(
//!     &rec,
//!     &mut sink,
//!     "noise",
//!     &RmsParams::default(),
//!     &ChunkConfig::default(),
//!     &mut NoProgress,
//! )?;
//! assert!(!done.is_aborted());
//! assert_eq!(sink.shape("noise/rms")?, vec![1, 13]);
//! # Ok::<(), ephys_analysis::Error>(())
//! ```
//!
//! [`Recording`]: ephys_core::Recording
//! [`Store`]: ephys_core::Store

mod error;
pub use error::{Error, Result};

pub mod decimate;
pub mod destructive;
pub mod extract;
pub mod noise;
pub mod processed;
pub mod provenance;
pub mod rms;
pub mod spectrogram;

pub use decimate::{decimate, DecimateParams};
pub use destructive::{truncate_waveform, zero_waveform};
pub use extract::{extract_spikes, ExtractParams, ExtractionState, WindowGeometry};
pub use noise::{estimate_noise, DEFAULT_NOISE_DURATION_S};
pub use processed::{ProcessedRecording, ProcessingConfig};
pub use provenance::{copy_block_data, BlockData, ExtractionStamp};
pub use rms::{running_rms, RmsEstimator, RmsParams};
pub use spectrogram::{spectrogram, SpectrogramParams};
