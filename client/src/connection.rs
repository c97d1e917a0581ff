//! Push channel driver over tokio-tungstenite.
//!
//! [`QueueConnection::spawn`] runs the channel in a background task and hands
//! back a [`QueueHandle`]. The task:
//!
//! - connects with the `X-Client-Id` header and sends `join` while the view
//!   still wants a place in line; a view holding or out of the line is
//!   brought up to date by the view the server pushes on every connect
//! - feeds every text frame into the [`QueueView`] and publishes the phase
//! - answers ping frames
//! - sends `leave` when the application opts out
//! - reconnects per the [`ReconnectPolicy`] after a transport loss, and
//!   leaves the view in [`Phase::ConnectionLost`] once retries run out
//!
//! The task ends when the view reaches a terminal phase or the handle is
//! dropped.

use crate::error::ClientError;
use crate::reconnect::ReconnectPolicy;
use crate::view::{Phase, QueueView, Reaction};
use futures::{SinkExt, StreamExt};
use ticket_queue_core::protocol::ClientMessage;
use ticket_queue_core::types::{ClientId, ResourceId};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

/// Header carrying the client identity on the upgrade request
pub const CLIENT_ID_HEADER: &str = "X-Client-Id";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Requests from the application to the driver task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    OptOut,
    Rejoin,
}

/// How a single connected session ended
enum SessionEnd {
    /// The view is final or the application went away
    Finished,
    /// The transport dropped; reconnect
    Dropped,
}

/// Push channel for one (ticket, client) pair
#[derive(Debug, Clone)]
pub struct QueueConnection {
    endpoint: String,
    client_id: ClientId,
    policy: ReconnectPolicy,
}

impl QueueConnection {
    /// Channel for `resource_id` on the server at `base_url`
    /// (e.g. `ws://localhost:8080`).
    #[must_use]
    pub fn new(base_url: &str, resource_id: ResourceId, client_id: ClientId) -> Self {
        let endpoint = format!(
            "{}/api/tickets/{resource_id}/ws",
            base_url.trim_end_matches('/')
        );
        Self {
            endpoint,
            client_id,
            policy: ReconnectPolicy::default(),
        }
    }

    /// Replace the reconnection policy
    #[must_use]
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// WebSocket URL this connection opens
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run the channel in a background task, driving `view`.
    #[must_use]
    pub fn spawn(self, view: QueueView) -> QueueHandle {
        let (phase_tx, phase_rx) = watch::channel(view.phase().clone());
        let (reaction_tx, reaction_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            connection: self,
            view,
            phase: phase_tx,
            reactions: reaction_tx,
            commands: command_rx,
            pending: Vec::new(),
        };
        let task = tokio::spawn(driver.run());

        QueueHandle {
            phase: phase_rx,
            reactions: reaction_rx,
            commands: command_tx,
            task,
        }
    }

    async fn open(&self) -> Result<Socket, ClientError> {
        let mut request = self.endpoint.as_str().into_client_request()?;
        let identity = HeaderValue::from_str(&self.client_id.to_string())
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(CLIENT_ID_HEADER, identity);

        let (socket, _response) = connect_async(request).await?;
        Ok(socket)
    }
}

/// Application side of a running [`QueueConnection`]
#[derive(Debug)]
pub struct QueueHandle {
    phase: watch::Receiver<Phase>,
    reactions: mpsc::UnboundedReceiver<Reaction>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<Result<(), ClientError>>,
}

impl QueueHandle {
    /// Latest phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase.borrow().clone()
    }

    /// Watch the phase for changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    /// Next reaction to an applied event, `None` once the driver stopped
    pub async fn next_reaction(&mut self) -> Option<Reaction> {
        self.reactions.recv().await
    }

    /// Leave the queue, or give up the turn if holding it
    pub fn opt_out(&self) {
        let _ = self.commands.send(Command::OptOut);
    }

    /// Join again after being dequeued
    pub fn rejoin(&self) {
        let _ = self.commands.send(Command::Rejoin);
    }

    /// Wait for the driver to stop.
    ///
    /// # Errors
    ///
    /// [`ClientError::RetriesExhausted`] when the connection was lost for good,
    /// [`ClientError::Task`] if the driver task panicked.
    pub async fn finished(self) -> Result<Phase, ClientError> {
        self.task.await??;
        let phase = self.phase.borrow().clone();
        Ok(phase)
    }
}

// ============================================================================
// Driver
// ============================================================================

struct Driver {
    connection: QueueConnection,
    view: QueueView,
    phase: watch::Sender<Phase>,
    reactions: mpsc::UnboundedSender<Reaction>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Frames requested while disconnected
    pending: Vec<ClientMessage>,
}

impl Driver {
    async fn run(mut self) -> Result<(), ClientError> {
        // Reconnect attempts since the last good connection
        let mut attempts = 0;

        loop {
            match self.connection.open().await {
                Ok(socket) => {
                    info!(endpoint = %self.connection.endpoint, "Push channel connected");
                    attempts = 0;
                    match self.session(socket).await {
                        Ok(SessionEnd::Finished) => return Ok(()),
                        Ok(SessionEnd::Dropped) => {
                            warn!("Push channel closed by server");
                        },
                        Err(error) => {
                            warn!(%error, "Push channel dropped");
                        },
                    }
                },
                Err(error) => {
                    warn!(%error, attempts, "Push channel connect failed");
                },
            }

            if !self.connection.policy.allows(attempts) {
                warn!(attempts, "Giving up on the push channel");
                self.view.connection_lost();
                self.publish(Reaction::Finished);
                return Err(ClientError::RetriesExhausted { attempts });
            }

            let delay = self.connection.policy.jittered_delay(attempts);
            attempts += 1;
            debug!(attempt = attempts, delay_ms = delay.as_millis(), "Reconnecting");
            if !self.wait(delay).await {
                return Ok(());
            }
        }
    }

    /// Sleep before a reconnect, still taking commands. `false` once the
    /// application went away.
    async fn wait(&mut self, delay: std::time::Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return true,
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        return false;
                    };
                    if let Some(message) = self.command(command) {
                        self.pending.push(message);
                    }
                }
            }
        }
    }

    async fn session(&mut self, socket: Socket) -> Result<SessionEnd, ClientError> {
        let (mut write, mut read) = socket.split();

        if self.view.wants_join() {
            send(&mut write, ClientMessage::Join).await?;
        }
        for message in std::mem::take(&mut self.pending) {
            send(&mut write, message).await?;
        }

        loop {
            tokio::select! {
                frame = read.next() => {
                    let Some(frame) = frame else {
                        return Ok(SessionEnd::Dropped);
                    };
                    match frame? {
                        Message::Text(text) => {
                            match self.view.apply_frame(&text) {
                                Ok(reaction) => self.publish(reaction),
                                Err(error) => warn!(%error, "Ignoring malformed server frame"),
                            }
                            if self.view.phase().is_terminal() {
                                let _ = write.send(Message::Close(None)).await;
                                return Ok(SessionEnd::Finished);
                            }
                        },
                        Message::Ping(payload) => {
                            write.send(Message::Pong(payload)).await?;
                        },
                        Message::Close(_) => return Ok(SessionEnd::Dropped),
                        _ => {},
                    }
                },
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(SessionEnd::Finished);
                    };
                    if let Some(message) = self.command(command) {
                        send(&mut write, message).await?;
                    }
                },
            }
        }
    }

    fn command(&mut self, command: Command) -> Option<ClientMessage> {
        let message = match command {
            Command::OptOut => self.view.opt_out(),
            Command::Rejoin => self.view.rejoin(),
        };
        if message.is_some() {
            self.publish(Reaction::Updated);
        }
        message
    }

    fn publish(&self, reaction: Reaction) {
        if reaction == Reaction::Ignored {
            return;
        }
        self.phase.send_replace(self.view.phase().clone());
        let _ = self.reactions.send(reaction);
    }
}

async fn send<S>(write: &mut S, message: ClientMessage) -> Result<(), ClientError>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(&message)?;
    write.send(Message::Text(json)).await?;
    Ok(())
}
