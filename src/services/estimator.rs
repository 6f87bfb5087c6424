use crate::models::{EstimateResult, ImageSource};

#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    /// The model decided the input is not a food item
    #[error("{0}")]
    NotFood(String),
    /// Non-success HTTP status from the LLM API
    #[error("LLM API error ({status}): {body}")]
    Upstream { status: u16, body: String },
    /// The model answered, but not in the requested shape
    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl EstimateError {
    pub fn is_not_food(&self) -> bool {
        matches!(self, EstimateError::NotFood(_))
    }
}

/// Turns a dish name into a carbon footprint estimate
#[async_trait::async_trait]
pub trait DishEstimator: Send + Sync {
    async fn estimate_carbon(&self, dish: &str) -> Result<EstimateResult, EstimateError>;
}

/// Names the main dish visible in a photo
#[async_trait::async_trait]
pub trait DishIdentifier: Send + Sync {
    async fn identify_dish(&self, image: &ImageSource) -> Result<String, EstimateError>;
}
