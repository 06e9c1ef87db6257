//! Cross-column analyses built on the aggregation pass.

pub mod correlation;
pub mod outliers;
pub mod quality;

pub use correlation::{CorrelationAccumulator, PairwiseMoments};
pub use outliers::{OutlierAccumulator, OutlierBounds, OutlierDetector};
pub use quality::{DataQualityScan, DataQualitySummary};
