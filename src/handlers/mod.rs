pub mod estimate;

pub use estimate::{EstimationHandler, ImageEstimateError};
