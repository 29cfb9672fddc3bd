//! Error types for ephys-dsp

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid cutoff: {0}")]
    InvalidCutoff(String),

    #[error("Invalid filter order {0}: must be at least 1")]
    InvalidOrder(usize),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Singular system while computing filter initial conditions")]
    Singular,
}

pub type Result<T> = std::result::Result<T, Error>;
