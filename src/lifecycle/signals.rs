//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl-C)
//! - Translate it into `SystemEvent::Shutdown`

use crate::lifecycle::{EventBus, SystemEvent};

/// Wait for Ctrl-C and publish a shutdown event.
pub async fn shutdown_on_ctrl_c(bus: EventBus) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Interrupt received, shutting down");
            bus.publish(SystemEvent::Shutdown);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install signal handler");
        }
    }
}
