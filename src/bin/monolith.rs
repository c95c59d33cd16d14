//! Monolith Binary - single-server deployment
//!
//! Wires up:
//! - Metadata store (Redis when `REDIS_URL` is set, in-memory otherwise)
//! - Content index and generation engine HTTP clients
//! - Per-video event broadcaster with heartbeat
//! - JSON/SSE HTTP API

use lectio::adapters::local::{http, EventBroadcaster, MemoryStore};
use lectio::adapters::remote::{HttpContentIndex, OllamaEngine};
use lectio::application::StudyService;
use lectio::config::ServiceConfig;
use lectio::ports::repository::MetadataStore;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = ServiceConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match config.redis_url.clone() {
        #[cfg(feature = "redis")]
        Some(url) => match lectio::adapters::local::RedisPool::new(&url) {
            Ok(pool) => serve(pool, config).await,
            Err(e) => {
                error!("Failed to create Redis pool: {}", e);
                process::exit(1);
            }
        },
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            warn!("REDIS_URL set but built without the redis feature, using in-memory store");
            serve(MemoryStore::new(), config).await
        }
        None => {
            warn!("REDIS_URL not set, metadata is kept in memory only");
            serve(MemoryStore::new(), config).await
        }
    }
}

async fn serve<S: MetadataStore + 'static>(store: S, config: ServiceConfig) {
    // 1. Outbound clients
    let index = match HttpContentIndex::new(
        &config.content_index_url,
        config.content_index_api_key.clone(),
    ) {
        Ok(index) => index,
        Err(e) => {
            error!("Failed to build content index client: {}", e);
            process::exit(1);
        }
    };
    let engine = match OllamaEngine::new(&config.generation_url) {
        Ok(engine) => engine.with_model(&config.generation_model),
        Err(e) => {
            error!("Failed to build generation client: {}", e);
            process::exit(1);
        }
    };
    if config.content_index_id.is_none() {
        warn!("CONTENT_INDEX_ID not set, submissions will be rejected by the index");
    }

    // 2. Event system
    let shutdown = CancellationToken::new();
    let events = Arc::new(EventBroadcaster::new(config.event_capacity));
    let heartbeat = events.spawn_heartbeat(config.heartbeat, shutdown.clone());

    // 3. Application service
    let service = Arc::new(StudyService::new(
        Arc::new(store),
        Arc::new(index),
        Arc::new(engine),
        events,
        config.pipeline(),
    ));

    // 4. HTTP layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = http::router(service).layer(cors);

    // 5. Start server
    let listener = match tokio::net::TcpListener::bind(config.bind_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.bind_address(), e);
            process::exit(1);
        }
    };
    info!("Listening at {}", config.bind_address());

    let token = shutdown.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            token.cancel();
        })
        .await;

    shutdown.cancel();
    let _ = heartbeat.await;
    if let Err(e) = result {
        error!("Server error: {}", e);
        process::exit(1);
    }
}
