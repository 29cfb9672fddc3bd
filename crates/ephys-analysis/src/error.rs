//! Error types for ephys-analysis

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] ephys_core::Error),

    #[error(transparent)]
    Dsp(#[from] ephys_dsp::Error),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// True for errors raised while validating parameters, before any
    /// output was written.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::Dsp(_)
                | Error::Core(ephys_core::Error::Configuration(_))
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Core(ephys_core::Error::Json(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
