//! Unix domain socket server for IPC
//!
//! Accepts frames and lifecycle requests for the controller queue, answers
//! status queries, and pushes kiosk events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::controller::ControlEvent;
use crate::events::KioskEvent;

use super::protocol::{KioskStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Queue into the controller task
    control_tx: mpsc::Sender<ControlEvent>,
    /// Source of notifications for subscribed clients
    event_tx: broadcast::Sender<KioskEvent>,
}

/// Shared server state
struct ServerState {
    status: KioskStatus,
    start_time: std::time::Instant,
}

/// A parsed request, or the reason it could not be parsed
type Incoming = std::result::Result<Request, String>;

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        control_tx: mpsc::Sender<ControlEvent>,
        event_tx: broadcast::Sender<KioskEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path)
            .context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: KioskStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            control_tx,
            event_tx,
        })
    }

    /// Mirror a kiosk event into the status snapshot
    pub async fn apply_event(&self, event: &KioskEvent) {
        let mut server_state = self.state.write().await;
        match event {
            KioskEvent::StateChanged { from, to } => {
                server_state.status.state = *to;
                server_state.status.page = to.page();
                debug!(from = %from, to = %to, "IPC server: state updated");
            }
            KioskEvent::DetectionStarted => server_state.status.detecting = true,
            KioskEvent::DetectionStopped => server_state.status.detecting = false,
            _ => {}
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref()
            .context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let control_tx = self.control_tx.clone();
                    let event_tx = self.event_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, control_tx, event_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    ///
    /// Requests are read on a separate task so a subscribed client can be
    /// sent notifications while no request is pending.
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        control_tx: mpsc::Sender<ControlEvent>,
        event_tx: broadcast::Sender<KioskEvent>,
    ) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let (request_tx, mut request_rx) = mpsc::channel::<Incoming>(16);

        let reader_task = tokio::spawn(async move {
            if let Err(e) = Self::read_requests(reader, request_tx).await {
                debug!(?e, "client read error");
            }
        });

        let mut subscription: Option<broadcast::Receiver<KioskEvent>> = None;

        let result = loop {
            tokio::select! {
                incoming = request_rx.recv() => {
                    let Some(incoming) = incoming else {
                        break Ok(());
                    };

                    let response = match incoming {
                        Ok(request) => {
                            debug!(?request, "received request");
                            let (response, subscribe) =
                                Self::process_request(request, &state, &control_tx).await;
                            if subscribe && subscription.is_none() {
                                subscription = Some(event_tx.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            response
                        }
                        Err(message) => Response::Error {
                            code: "bad_request".to_string(),
                            message,
                        },
                    };

                    if let Err(e) = Self::send_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }

                event = next_event(&mut subscription) => match event {
                    Ok(event) => {
                        let note = Notification::Event { event };
                        if let Err(e) = Self::send_message(&mut writer, &note).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        subscription = None;
                    }
                },
            }
        };

        reader_task.abort();
        result
    }

    /// Read length-prefixed JSON requests until the client disconnects
    async fn read_requests(
        mut reader: OwnedReadHalf,
        request_tx: mpsc::Sender<Incoming>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            reader.read_exact(&mut msg_buf).await?;

            let incoming = serde_json::from_slice::<Request>(&msg_buf)
                .map_err(|e| format!("failed to parse request: {e}"));

            if request_tx.send(incoming).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        control_tx: &mpsc::Sender<ControlEvent>,
    ) -> (Response, bool) {
        let forward = match request {
            Request::Ping => return (Response::Pong, false),

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                return (Response::Status(state.status.clone()), false);
            }

            Request::Subscribe => return (Response::Subscribed, true),

            Request::StartDetection => ControlEvent::StartDetection,
            Request::StopDetection => ControlEvent::StopDetection,
            Request::SubmitFrame(frame) => ControlEvent::Frame(frame),
        };

        match control_tx.send(forward).await {
            Ok(()) => (Response::Accepted, false),
            Err(_) => (
                Response::Error {
                    code: "unavailable".to_string(),
                    message: "flow controller is not running".to_string(),
                },
                false,
            ),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Next event for a subscribed client; never resolves when not subscribed
async fn next_event(
    subscription: &mut Option<broadcast::Receiver<KioskEvent>>,
) -> std::result::Result<KioskEvent, broadcast::error::RecvError> {
    match subscription {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
