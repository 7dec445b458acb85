//! Ad delivery — eligibility-ranked recommendations and billed exposure
//! recording.

pub mod exposure;
pub mod recommend;

pub use exposure::{ExposureRecord, ExposureRecorder, ExposureStore};
pub use recommend::RecommendationEngine;
