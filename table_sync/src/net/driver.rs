//! Async owner of the socket and the clock.
//!
//! The driver runs as its own task, executing the [`ConnectionManager`]'s
//! commands against a [`Connector`] and feeding back frames, closes, and
//! timer deadlines. Callers talk to it through a cloneable
//! [`ConnectionHandle`].

use log::{debug, info, warn};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Duration, Instant, sleep_until, timeout},
};

use super::{
    connection::{Command, ConnectionManager, ConnectionState, SendOutcome},
    envelope::Envelope,
    errors::{ConnectionError, ConnectionResult, TransportError},
    messages::{ClientMessage, MessageKind, ServerMessage},
    registry::{Handler, HandlerId},
    transport::{Connector, Transport},
};
use crate::{config::ConnectionConfig, scheduler::Millis};

enum DriverCommand {
    Connect {
        endpoint: String,
    },
    Send {
        envelope: Envelope<ClientMessage>,
        response: oneshot::Sender<ConnectionResult<SendOutcome>>,
    },
    On {
        kind: MessageKind,
        handler: Handler,
        response: oneshot::Sender<HandlerId>,
    },
    Off {
        kind: MessageKind,
        handler: Option<HandlerId>,
        response: oneshot::Sender<usize>,
    },
    Disconnect {
        response: oneshot::Sender<()>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running [`ConnectionDriver`].
#[derive(Clone)]
pub struct ConnectionHandle {
    sender: mpsc::UnboundedSender<DriverCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Start connecting. Does nothing if already connected or connecting.
    pub fn connect(&self, endpoint: impl Into<String>) -> ConnectionResult<()> {
        self.sender
            .send(DriverCommand::Connect {
                endpoint: endpoint.into(),
            })
            .map_err(|_| ConnectionError::DriverClosed)
    }

    /// Send a message now, or queue it until the next successful connect.
    pub async fn send(&self, message: ClientMessage) -> ConnectionResult<SendOutcome> {
        self.send_envelope(Envelope::new(message)).await
    }

    pub async fn send_envelope(
        &self,
        envelope: Envelope<ClientMessage>,
    ) -> ConnectionResult<SendOutcome> {
        let (response, rx) = oneshot::channel();
        self.request(DriverCommand::Send { envelope, response }, rx)
            .await?
    }

    /// Register a handler for one inbound message type.
    pub async fn on<F>(&self, kind: MessageKind, handler: F) -> ConnectionResult<HandlerId>
    where
        F: FnMut(&Envelope<ServerMessage>) -> anyhow::Result<()> + Send + 'static,
    {
        let (response, rx) = oneshot::channel();
        let handler: Handler = Box::new(handler);
        self.request(
            DriverCommand::On {
                kind,
                handler,
                response,
            },
            rx,
        )
        .await
    }

    /// Remove one handler, or every handler for `kind` when `handler` is
    /// `None`. Returns how many were removed.
    pub async fn off(
        &self,
        kind: MessageKind,
        handler: Option<HandlerId>,
    ) -> ConnectionResult<usize> {
        let (response, rx) = oneshot::channel();
        self.request(
            DriverCommand::Off {
                kind,
                handler,
                response,
            },
            rx,
        )
        .await
    }

    /// Close cleanly. Queued messages are dropped and no reconnect follows.
    pub async fn disconnect(&self) -> ConnectionResult<()> {
        let (response, rx) = oneshot::channel();
        self.request(DriverCommand::Disconnect { response }, rx)
            .await
    }

    /// Disconnect and stop the driver task.
    pub async fn shutdown(&self) -> ConnectionResult<()> {
        let (response, rx) = oneshot::channel();
        self.request(DriverCommand::Shutdown { response }, rx).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that observes every published state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    async fn request<T>(
        &self,
        command: DriverCommand,
        rx: oneshot::Receiver<T>,
    ) -> ConnectionResult<T> {
        self.sender
            .send(command)
            .map_err(|_| ConnectionError::DriverClosed)?;
        rx.await.map_err(|_| ConnectionError::DriverClosed)
    }
}

/// Runs one [`ConnectionManager`] against a [`Connector`].
pub struct ConnectionDriver<C> {
    manager: ConnectionManager,
    connector: C,
    inbox: mpsc::UnboundedReceiver<DriverCommand>,
    state: watch::Sender<ConnectionState>,
    transport: Option<Box<dyn Transport>>,
    started: Instant,
}

impl<C: Connector + 'static> ConnectionDriver<C> {
    pub fn new(config: ConnectionConfig, connector: C) -> (Self, ConnectionHandle) {
        let (sender, inbox) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let driver = Self {
            manager: ConnectionManager::new(config),
            connector,
            inbox,
            state,
            transport: None,
            started: Instant::now(),
        };
        let handle = ConnectionHandle {
            sender,
            state: state_rx,
        };
        (driver, handle)
    }

    /// Spawn the driver on the current runtime.
    pub fn spawn(config: ConnectionConfig, connector: C) -> ConnectionHandle {
        let (driver, handle) = Self::new(config, connector);
        tokio::spawn(driver.run());
        handle
    }

    /// Run until every handle is dropped or `shutdown` is requested.
    pub async fn run(mut self) {
        debug!("Connection driver starting");

        loop {
            let deadline = self.manager.next_deadline();

            tokio::select! {
                command = self.inbox.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }

                frame = next_frame(&mut self.transport) => {
                    let now = self.now();
                    match frame {
                        Some(Ok(frame)) => {
                            let _ = self.manager.on_frame(&frame);
                        }
                        Some(Err(e)) => {
                            warn!("{e}");
                            self.drop_transport().await;
                            self.manager.on_closed(now);
                        }
                        None => {
                            self.transport = None;
                            self.manager.on_closed(now);
                        }
                    }
                    self.pump().await;
                }

                _ = wait_until(self.started, deadline) => {
                    let now = self.now();
                    self.manager.on_timer(now);
                    self.pump().await;
                }
            }
        }

        self.manager.disconnect();
        self.pump().await;
        debug!("Connection driver stopped");
    }

    /// Returns `false` when the driver should stop.
    async fn handle_command(&mut self, command: DriverCommand) -> bool {
        match command {
            DriverCommand::Connect { endpoint } => {
                self.manager.connect(&endpoint);
                self.pump().await;
            }
            DriverCommand::Send { envelope, response } => {
                let result = self.manager.send_envelope(envelope);
                self.pump().await;
                let _ = response.send(result);
            }
            DriverCommand::On {
                kind,
                handler,
                response,
            } => {
                let _ = response.send(self.manager.on(kind, handler));
            }
            DriverCommand::Off {
                kind,
                handler,
                response,
            } => {
                let _ = response.send(self.manager.off(kind, handler));
            }
            DriverCommand::Disconnect { response } => {
                self.manager.disconnect();
                self.pump().await;
                let _ = response.send(());
            }
            DriverCommand::Shutdown { response } => {
                self.manager.disconnect();
                self.pump().await;
                let _ = response.send(());
                return false;
            }
        }
        true
    }

    /// Execute every pending manager command, then publish the state.
    async fn pump(&mut self) {
        while let Some(command) = self.manager.poll_command() {
            match command {
                Command::Open { endpoint } => self.open(&endpoint).await,
                Command::Transmit(frame) => self.transmit(frame).await,
                Command::Close => self.drop_transport().await,
            }
        }
        let current = self.manager.state();
        self.state.send_if_modified(|state| {
            if *state == current {
                false
            } else {
                *state = current;
                true
            }
        });
    }

    async fn open(&mut self, endpoint: &str) {
        self.drop_transport().await;
        let limit = self.manager.config().connect_timeout;
        let result = match timeout(limit, self.connector.connect(endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectTimeout(endpoint.to_string())),
        };

        let now = self.now();
        match result {
            Ok(transport) => {
                info!("Connected to {endpoint}");
                self.transport = Some(transport);
                self.manager.on_open(now);
            }
            Err(e) => self.manager.on_open_failed(now, &e.to_string()),
        }
    }

    async fn transmit(&mut self, frame: String) {
        let now = self.now();
        let Some(transport) = self.transport.as_mut() else {
            self.manager.on_transmit_failed(now, frame);
            return;
        };

        if let Err(e) = transport.send(frame.clone()).await {
            warn!("{e}");
            self.drop_transport().await;
            self.manager.on_transmit_failed(now, frame);
        }
    }

    async fn drop_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
    }

    fn now(&self) -> Millis {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(Millis::MAX)
    }
}

async fn next_frame(
    transport: &mut Option<Box<dyn Transport>>,
) -> Option<Result<String, TransportError>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(started: Instant, deadline: Option<Millis>) {
    match deadline {
        Some(deadline) => sleep_until(started + Duration::from_millis(deadline)).await,
        None => std::future::pending().await,
    }
}
