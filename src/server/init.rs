//! Server initialization and main run loop

use super::background_tasks::start_dlq_sweep;
use super::config::{load_config, AppConfig};
use super::providers::resolve_backends;
use super::task_handler::build_executor;
use crate::api::{self, CallbackKeys, StreamSettings};
use anyhow::{Context, Result};
use axum::{routing::get, Extension, Router};
use conclave_core::{
    shutdown::wait_for_shutdown_signal, CouncilConfig, CouncilEngine, DeadLetterQueue, DlqConfig,
    InMemoryStore, KvStore, LocalPoolConfig, Orchestrator, ProgressChannel, QueueConfig,
    RedisStore, RemoteConfig, ShutdownController, Task, TaskQueue, TaskRepository,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Run the server
pub async fn run(port_override: Option<u16>, config_file: Option<String>) -> Result<()> {
    info!("Starting Conclave v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        load_config(config_file.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = port_override {
        config.server.port = port;
    }
    info!("Configuration loaded");

    let kv = connect_store(&config.redis.url).await;

    let registry = resolve_backends(&config.llm)?;
    let engine = Arc::new(CouncilEngine::new(registry));
    let council_config = council_config_from(&config);

    let repo = TaskRepository::new(kv.clone());
    let progress = ProgressChannel::new(kv.clone());

    let dlq = Arc::new(DeadLetterQueue::new(
        kv.clone(),
        DlqConfig {
            max_retries: config.dlq.max_retries,
            sweep_interval: Duration::from_secs(config.dlq.sweep_interval_secs),
            sweep_batch: config.dlq.sweep_batch,
            ..Default::default()
        },
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        repo.clone(),
        progress.clone(),
        engine,
        council_config,
        dlq.clone(),
    ));

    let shutdown_controller = ShutdownController::new();
    let executor = build_executor(orchestrator.clone(), shutdown_controller.clone());

    let queue = Arc::new(
        TaskQueue::new(repo.clone(), executor, queue_config_from(&config))
            .context("Failed to build task queue")?,
    );

    // Restored dead-letter tasks re-enter through the normal dispatch path
    let redispatch_queue = queue.clone();
    dlq.set_redispatch(Arc::new(move |task: Task| {
        let queue = redispatch_queue.clone();
        Box::pin(async move {
            queue.dispatch(task).await?;
            Ok(())
        })
    }));

    start_dlq_sweep(&dlq, &shutdown_controller);

    let callback_keys = Arc::new(CallbackKeys::new(
        config.queue.signing_key.clone(),
        config.queue.next_signing_key.clone(),
    ));
    let stream_settings = Arc::new(StreamSettings {
        poll_interval: Duration::from_millis(config.stream.poll_ms),
        heartbeat: Duration::from_secs(config.stream.heartbeat_secs),
        max_duration: Duration::from_secs(config.stream.max_duration_secs),
    });

    let app = Router::new()
        .merge(api::health_routes())
        .merge(api::docs_routes())
        .merge(api::api_router())
        .route("/", get(|| async { "Conclave orchestration server" }))
        .layer(Extension(kv))
        .layer(Extension(repo))
        .layer(Extension(progress))
        .layer(Extension(queue))
        .layer(Extension(dlq))
        .layer(Extension(orchestrator))
        .layer(Extension(callback_keys))
        .layer(Extension(stream_settings))
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("HTTP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let server_shutdown = shutdown_controller.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            server_shutdown.shutdown().await;
        })
        .await
        .context("HTTP server error")?;

    info!("Conclave shutdown complete");
    Ok(())
}

/// Connect to Redis, falling back to the in-memory store when it is
/// unreachable. Opening a client only parses the URL, so reachability is
/// verified with a ping before the store is used.
async fn connect_store(redis_url: &str) -> Arc<dyn KvStore> {
    match RedisStore::new(redis_url) {
        Ok(store) => match store.ping().await {
            Ok(()) => {
                info!("Redis store initialized");
                Arc::new(store)
            }
            Err(e) => {
                warn!(error = %e, "Redis unreachable, using in-memory store");
                Arc::new(InMemoryStore::new())
            }
        },
        Err(e) => {
            warn!(error = %e, "Invalid Redis URL, using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    }
}

fn council_config_from(config: &AppConfig) -> CouncilConfig {
    CouncilConfig {
        min_models: config.council.min_models,
        max_models: config.council.max_models,
        temperature: config.council.temperature,
        max_tokens: config.council.max_tokens,
        quality_synthesis: config.council.quality_synthesis,
        ..Default::default()
    }
}

fn queue_config_from(config: &AppConfig) -> QueueConfig {
    let remote = match (&config.queue.push_endpoint, &config.queue.signing_key) {
        (Some(endpoint), Some(key)) => {
            info!(endpoint = %endpoint, "remote push-queue dispatch enabled");
            Some(RemoteConfig::new(endpoint, key))
        }
        (Some(_), None) => {
            warn!("push_endpoint set without signing_key; using local dispatch only");
            None
        }
        _ => {
            info!("local-only dispatch (no push_endpoint configured)");
            None
        }
    };
    QueueConfig {
        remote,
        local: LocalPoolConfig {
            max_concurrent: config.queue.max_concurrent,
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        // Nothing listens on port 1, so the ping fails and the in-memory
        // store takes over; it must be immediately usable.
        let kv = connect_store("redis://127.0.0.1:1").await;
        kv.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_invalid_redis_url_falls_back_to_memory() {
        let kv = connect_store("not a url").await;
        assert_eq!(kv.get("missing").await.unwrap(), None);
    }
}
