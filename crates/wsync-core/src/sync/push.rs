//! Push notification listener
//!
//! Keeps a WebSocket open to the server's push endpoint. When the server
//! announces that files changed (`{"type": "doFileUpdate"}`), the listener
//! asks the scheduler for a forced round that also reports workspaces
//! shared with the user. Reconnects automatically with exponential backoff.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::scheduler::SchedulerCommand;

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected, not trying
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and listening
    Connected,
}

/// Messages understood by the listener
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum PushMessage {
    #[serde(rename = "doFileUpdate")]
    DoFileUpdate,
    #[serde(other)]
    Other,
}

impl PushMessage {
    /// Decode a text frame; anything unreadable is `None`
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Configuration for the push listener
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// WebSocket URL
    pub url: String,
    /// Initial reconnect delay
    pub initial_reconnect_delay: Duration,
    /// Maximum reconnect delay
    pub max_reconnect_delay: Duration,
}

impl PushConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

/// Handle to control the push listener task
pub struct PushListenerHandle {
    shutdown_tx: watch::Sender<bool>,
    /// Watch connection status
    pub status_rx: watch::Receiver<ConnectionStatus>,
    handle: JoinHandle<()>,
}

impl PushListenerHandle {
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Close the connection and wait for the task to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!("Push listener ended abnormally: {}", e);
        }
    }
}

/// Spawn the push listener
///
/// The task ends on [`PushListenerHandle::shutdown`] or when the scheduler's
/// command channel closes.
pub fn spawn_push_listener(
    config: PushConfig,
    commands: mpsc::Sender<SchedulerCommand>,
) -> PushListenerHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

    let handle = tokio::spawn(listener_loop(config, commands, shutdown_rx, status_tx));

    PushListenerHandle {
        shutdown_tx,
        status_rx,
        handle,
    }
}

/// Main loop with reconnection
async fn listener_loop(
    config: PushConfig,
    commands: mpsc::Sender<SchedulerCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
    status_tx: watch::Sender<ConnectionStatus>,
) {
    let mut reconnect_delay = config.initial_reconnect_delay;

    loop {
        let _ = status_tx.send(ConnectionStatus::Connecting);

        match listen(&config, &commands, &mut shutdown_rx, &status_tx).await {
            Ok(true) => break,
            Ok(false) => {
                // Closed by the server after a healthy connection
                reconnect_delay = config.initial_reconnect_delay;
            }
            Err(e) => warn!("Push connection error: {:#}", e),
        }

        let _ = status_tx.send(ConnectionStatus::Disconnected);

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {
                reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    let _ = status_tx.send(ConnectionStatus::Disconnected);
    debug!("Push listener exited");
}

/// Connect and forward notifications until disconnection
///
/// Returns `Ok(true)` when the listener should stop for good.
async fn listen(
    config: &PushConfig,
    commands: &mpsc::Sender<SchedulerCommand>,
    shutdown_rx: &mut watch::Receiver<bool>,
    status_tx: &watch::Sender<ConnectionStatus>,
) -> Result<bool> {
    let (ws_stream, _) = connect_async(config.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", config.url))?;
    let (mut write, mut read) = ws_stream.split();

    let _ = status_tx.send(ConnectionStatus::Connected);
    info!("Listening for push notifications on {}", config.url);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                write.close().await.ok();
                return Ok(true);
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if PushMessage::parse(&text) == Some(PushMessage::DoFileUpdate) {
                            debug!("Server announced file updates");
                            let command = SchedulerCommand::SyncNow {
                                force: true,
                                notify_new_workspaces: true,
                            };
                            if commands.send(command).await.is_err() {
                                write.close().await.ok();
                                return Ok(true);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(false),
                    Some(Err(e)) => return Err(e.into()),
                    _ => {}
                }
            }
        }
    }
}
