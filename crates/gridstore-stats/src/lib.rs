//! Statistics over chunked grids.
//!
//! A grid keeps its count, exact sum and extremes in a [`GridStatistics`],
//! either maintained on every write or recomputed lazily. Order statistics
//! and quantile classes are computed by scanning a [`ChunkSource`].
//!
//! [`ChunkSource`]: gridstore_core::ChunkSource

pub mod error;
pub mod quantile;
pub mod running;
pub mod scan;
pub mod statistics;

pub use error::{Result, StatsError};
pub use quantile::{quantile_class_map, Classifier, QuantileClassMap};
pub use running::RunningStats;
pub use scan::{full_scan, median, mode, standard_deviation, value_counts};
pub use statistics::{GridStatistics, NotUpdatedStats, StatsMode, UpdatedStats};
