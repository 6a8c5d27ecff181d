//! Error type shared by every decoder and aggregator in the crate

use thiserror::Error;

use crate::decoder::{MetricFormat, MetricsFile};

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, InteropError>;

#[derive(Debug, Error)]
pub enum InteropError {
    /// The version byte is not one the format's layout table knows
    #[error("unsupported {format} version {version}")]
    UnsupportedVersion { format: &'static str, version: u8 },

    /// The stream ended inside a record. `records` complete records came first.
    #[error("truncated {format} record after {records} complete records")]
    TruncatedRecord { format: &'static str, records: usize },

    /// Quality-bin table out of bounds
    #[error("invalid qbin config: {0}")]
    InvalidQbinConfig(String),

    /// A decomposed tile (or its cycle) does not fit the grid it is being placed into
    #[error("lane {lane} tile {tile} cycle {cycle} is outside the flowcell grid")]
    IndexOutOfRange { lane: u16, tile: u16, cycle: u16 },

    /// Two sub-tile grids that must line up do not
    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A decode that stopped early. The records decoded before the failure are
/// kept in `partial` so a caller can decide whether they are still usable.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct DecodeFailure<F: MetricFormat> {
    pub error: InteropError,
    pub partial: Option<MetricsFile<F>>,
}

impl<F: MetricFormat> DecodeFailure<F> {
    pub fn new(error: InteropError) -> Self {
        DecodeFailure {
            error,
            partial: None,
        }
    }
}

impl<F: MetricFormat> From<InteropError> for DecodeFailure<F> {
    fn from(error: InteropError) -> Self {
        DecodeFailure::new(error)
    }
}

impl<F: MetricFormat> From<std::io::Error> for DecodeFailure<F> {
    fn from(error: std::io::Error) -> Self {
        DecodeFailure::new(error.into())
    }
}

impl<F: MetricFormat> From<DecodeFailure<F>> for InteropError {
    fn from(failure: DecodeFailure<F>) -> Self {
        failure.error
    }
}
