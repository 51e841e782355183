//! The one executor shared by both dispatch paths
//!
//! The local worker pool and the remote-dispatch callback handler both run
//! tasks through the closure built here, so the two strategies cannot drift
//! apart. Each run registers a dispatch guard so shutdown can drain
//! in-flight pipelines.

use conclave_core::{ExecuteFn, Orchestrator, ShutdownController};
use std::sync::Arc;

/// Build the dispatch executor around the orchestrator
pub fn build_executor(
    orchestrator: Arc<Orchestrator>,
    shutdown: Arc<ShutdownController>,
) -> ExecuteFn {
    Arc::new(move |task| {
        let orchestrator = orchestrator.clone();
        let shutdown = shutdown.clone();
        Box::pin(async move {
            let _guard = shutdown.register_dispatch();
            orchestrator.execute(task.id).await
        })
    })
}
