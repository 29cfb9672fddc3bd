//! Centralized error type for the ephys umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] ephys_core::Error),

    #[error("DSP: {0}")]
    Dsp(#[from] ephys_dsp::Error),

    #[error(transparent)]
    Analysis(#[from] ephys_analysis::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the call was rejected before any output was written.
    pub fn is_configuration(&self) -> bool {
        match self {
            Error::Core(ephys_core::Error::Configuration(_)) | Error::Dsp(_) => true,
            Error::Analysis(e) => e.is_configuration(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
