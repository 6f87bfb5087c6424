pub mod cache; // Redis-backed estimate cache
pub mod estimator;
pub mod openai; // OpenAI chat completions (text + vision)
pub mod store;

pub use cache::ResultCache;
pub use estimator::{DishEstimator, DishIdentifier, EstimateError};
pub use openai::OpenAiService;
pub use store::{CacheStore, MemoryStore, RedisStore};
