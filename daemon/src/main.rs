//! wama-kiosk: flow controller daemon for the Wama kiosk character
//!
//! The daemon sits between the webcam inference process and the kiosk's
//! presentation client and provides:
//! - Majority-vote smoothing of the presence classifier output
//! - Thumbs-up / thumbs-down confirmation for the music question
//! - An explicit flow state machine with cooldowns, timeouts and timers
//! - IPC for frame intake, status queries and event push
//!
//! Out of scope: image processing, model inference, rendering and audio
//! playback. Those happen in external processes that talk to the socket.

mod config;
mod controller;
mod error;
mod events;
mod gesture;
mod ipc;
mod lifecycle;
mod signal;
mod state;

use std::time::Instant;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::controller::{ControlEvent, Controller};
use crate::events::KioskEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "wama-kiosk starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.flow, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Create channels for inter-component communication
    // IPC server -> controller (single consumer)
    let (control_tx, control_rx) = mpsc::channel::<ControlEvent>(64);
    // Controller -> IPC server and subscribed clients
    let (event_tx, _event_rx) = broadcast::channel::<KioskEvent>(256);

    // Create the flow controller
    let mut controller = Controller::new(config.flow.clone(), event_tx.clone());

    // Create IPC server
    let server = Server::new(&config.socket_path, control_tx.clone(), event_tx.clone())?;

    // Subscribe to kiosk events for the status snapshot
    let mut status_rx = event_tx.subscribe();
    let server_for_events = &server;

    // The kiosk watches from the moment it boots
    control_tx.send(ControlEvent::StartDetection).await?;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the controller (processes frames and heartbeats)
        _ = controller.run(control_rx, config.tick_interval) => {
            info!("flow controller exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC status snapshot in sync with the flow
        _ = async {
            loop {
                match status_rx.recv().await {
                    Ok(event) => {
                        debug!(%event, "kiosk event received");
                        server_for_events.apply_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "kiosk event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("kiosk event handler exited");
        }

        // Wait for shutdown signal
        reason = shutdown.wait() => {
            match reason {
                Ok(reason) => info!(?reason, "shutdown signal received"),
                Err(e) => error!(?e, "signal handling unavailable"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    controller.stop_detection(Instant::now());
    server.shutdown().await;

    info!("wama-kiosk stopped");

    Ok(())
}
