pub mod alert;
pub mod analyzer;
pub mod factors;
pub mod profile;
pub mod thresholds;

pub use analyzer::AmlAnalyzer;
pub use thresholds::LargeValueThresholds;
