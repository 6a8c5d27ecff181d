//! interop decodes the binary run-metric files an Illumina sequencer writes to
//! its `InterOp/` folder and aggregates them over the lane/surface/swath/tile
//! layout of the flowcell.

#[macro_use]
pub mod geometry;

pub mod box_whisker;
pub mod codec;
pub mod decoder;
pub mod error;

pub mod corrected_intensity;
pub mod error_metrics;
pub mod extraction_metrics;
pub mod grid_metrics;
pub mod image_metrics;
pub mod index_metrics;
pub mod phasing_metrics;
pub mod quality_metrics;
pub mod registration_metrics;
pub mod tile_metrics;

pub mod subtile;

pub use decoder::{decode_pair, MetricFormat, MetricsFile};
pub use error::{DecodeFailure, InteropError, Result};
