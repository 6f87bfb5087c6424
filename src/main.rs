mod api;
mod config;
mod handlers;
mod models;
mod services;

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::sync::Arc;

use config::{CacheBackend, Config};
use handlers::EstimationHandler;
use services::{CacheStore, MemoryStore, OpenAiService, RedisStore, ResultCache};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables (before the logger so RUST_LOG in .env applies)
    dotenv().ok();

    // Initialize logger
    env_logger::init();

    log::info!("🚀 Starting Carbon Footprint API...");

    let config = Config::from_env()?;

    let store: Arc<dyn CacheStore> = match config.cache_backend {
        CacheBackend::Redis => {
            let store = RedisStore::new(
                &config.redis_url,
                config.redis_connect_timeout,
                config.redis_operation_timeout,
            )?;
            log::info!("✅ Redis cache configured (connects on first use)");
            Arc::new(store)
        }
        CacheBackend::Memory => {
            log::warn!("⚠️ Using in-memory cache, entries are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let cache = Arc::new(ResultCache::with_ttl(store, config.cache_ttl));
    log::info!("✅ Result cache initialized (ttl: {:?})", cache.ttl());

    let openai = Arc::new(OpenAiService::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.openai_base_url.clone(),
    ));
    log::info!("✅ OpenAI service initialized with model: {}", openai.model());

    let handler = Arc::new(EstimationHandler::new(cache, openai.clone(), openai));

    let app = api::create_router(handler, &config.cors_origins, config.admin_token.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    log::info!("🌐 Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(())
}
