//! Anomaly detection and candidate ranking.

pub mod detector;
pub mod ranking;

pub use detector::{detect, Thresholds};
pub use ranking::{top_n, RunStats};
