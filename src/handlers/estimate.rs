use std::sync::Arc;

use crate::models::{EstimateResult, ImageSource};
use crate::services::{DishEstimator, DishIdentifier, EstimateError, ResultCache};

/// Why an image estimate failed. Callers need to know which stage broke to
/// word the error for the user.
#[derive(Debug)]
pub enum ImageEstimateError {
    /// The vision call could not name a dish
    Identification(EstimateError),
    /// A dish was named but estimating it failed
    Estimation { dish: String, error: EstimateError },
}

/// Cache-aside estimation: look up the normalized dish name, fall back to the
/// estimator on a miss and store what it returns.
///
/// Concurrent misses for the same dish each call the estimator; whichever
/// write lands last is kept.
pub struct EstimationHandler {
    cache: Arc<ResultCache>,
    estimator: Arc<dyn DishEstimator>,
    identifier: Arc<dyn DishIdentifier>,
}

impl EstimationHandler {
    pub fn new(
        cache: Arc<ResultCache>,
        estimator: Arc<dyn DishEstimator>,
        identifier: Arc<dyn DishIdentifier>,
    ) -> Self {
        Self {
            cache,
            estimator,
            identifier,
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub async fn estimate_dish(&self, dish: &str) -> Result<EstimateResult, EstimateError> {
        if let Some(cached) = self.cache.get(dish).await {
            log::info!("✅ Cache hit for dish: {}", dish);
            return Ok(cached);
        }

        log::info!("🔄 Cache miss for dish: {} - calling LLM", dish);
        let result = self.estimator.estimate_carbon(dish).await?;
        log::info!(
            "🌍 Estimated {} at {:.2} kg CO2e ({} ingredients)",
            result.dish,
            result.estimated_carbon_kg,
            result.ingredients.len()
        );

        if !self.cache.put(dish, &result).await {
            log::warn!("⚠️ Result for {} was not cached", dish);
        }

        Ok(result)
    }

    pub async fn estimate_image(
        &self,
        image: &ImageSource,
    ) -> Result<EstimateResult, ImageEstimateError> {
        let dish = self
            .identifier
            .identify_dish(image)
            .await
            .map_err(ImageEstimateError::Identification)?;

        log::info!("📸 Identified dish from image: {}", dish);

        self.estimate_dish(&dish)
            .await
            .map_err(|error| ImageEstimateError::Estimation { dish, error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ingredient;
    use crate::services::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEstimator {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DishEstimator for CountingEstimator {
        async fn estimate_carbon(&self, dish: &str) -> Result<EstimateResult, EstimateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if dish.trim().eq_ignore_ascii_case("rock") {
                return Err(EstimateError::NotFood("Rocks are not food.".to_string()));
            }
            Ok(EstimateResult {
                dish: dish.trim().to_string(),
                estimated_carbon_kg: 1.5,
                ingredients: vec![Ingredient {
                    name: "rice".to_string(),
                    carbon_kg: 1.5,
                }],
            })
        }
    }

    struct FixedIdentifier(Option<&'static str>);

    #[async_trait::async_trait]
    impl DishIdentifier for FixedIdentifier {
        async fn identify_dish(&self, _image: &ImageSource) -> Result<String, EstimateError> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| EstimateError::InvalidResponse("blurry".to_string()))
        }
    }

    fn build_handler(identified: Option<&'static str>) -> (Arc<CountingEstimator>, EstimationHandler) {
        let estimator = Arc::new(CountingEstimator {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(ResultCache::new(Arc::new(MemoryStore::new())));
        let handler = EstimationHandler::new(
            cache,
            estimator.clone(),
            Arc::new(FixedIdentifier(identified)),
        );
        (estimator, handler)
    }

    fn image() -> ImageSource {
        ImageSource::Url("https://example.com/food.jpg".to_string())
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let (estimator, handler) = build_handler(None);

        let first = handler.estimate_dish("Fried Rice").await.unwrap();
        let second = handler.estimate_dish("  fried rice ").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(estimator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_food_passes_through_and_is_not_cached() {
        let (estimator, handler) = build_handler(None);

        assert!(handler.estimate_dish("rock").await.unwrap_err().is_not_food());
        assert!(handler.estimate_dish("rock").await.is_err());
        assert_eq!(estimator.calls.load(Ordering::SeqCst), 2);
        assert!(handler.cache().get("rock").await.is_none());
    }

    #[tokio::test]
    async fn test_image_and_text_share_cache() {
        let (estimator, handler) = build_handler(Some("Fried Rice"));

        handler.estimate_dish("fried rice").await.unwrap();
        let result = handler.estimate_image(&image()).await.unwrap();

        assert_eq!(result.dish, "fried rice");
        assert_eq!(estimator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_image_errors_report_stage() {
        let (_, handler) = build_handler(None);
        assert!(matches!(
            handler.estimate_image(&image()).await,
            Err(ImageEstimateError::Identification(_))
        ));

        let (_, handler) = build_handler(Some("Rock"));
        match handler.estimate_image(&image()).await {
            Err(ImageEstimateError::Estimation { dish, error }) => {
                assert_eq!(dish, "Rock");
                assert!(error.is_not_food());
            }
            other => panic!("expected estimation error, got {:?}", other),
        }
    }
}
