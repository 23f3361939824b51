pub mod detector;
pub mod percentile;

pub use detector::OutlierDetector;
pub use percentile::{percentile, tail_bounds};
