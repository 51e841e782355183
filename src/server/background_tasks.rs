//! Background task startup

use conclave_core::{DeadLetterQueue, ShutdownController};
use std::sync::Arc;
use tracing::info;

/// Start the dead-letter sweep loop on its own shutdown token
pub fn start_dlq_sweep(dlq: &Arc<DeadLetterQueue>, shutdown: &ShutdownController) {
    let sweep_dlq = dlq.clone();
    let sweep_shutdown = shutdown.token();
    tokio::spawn(async move {
        sweep_dlq.run(sweep_shutdown).await;
    });
    info!("dead-letter sweep task started");
}
