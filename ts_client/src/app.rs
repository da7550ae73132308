//! The client's event loop.
//!
//! Inbound envelopes are forwarded from the connection driver's handlers into
//! one channel, so the session is only ever touched from this loop. The loop
//! also reads commands from stdin and wakes for the session's next
//! presentation deadline.

use anyhow::{Context, Result, anyhow, bail};
use std::io::Write;
use table_sync::{
    ClientMessage, ConnectionDriver, ConnectionError, ConnectionHandle, Envelope, MessageKind,
    ServerMessage, SessionEvent, TableSession, WsConnector, net::transport::Connector,
    scheduler::Millis,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    time::{Duration, Instant, sleep_until},
};
use tracing::{debug, info, warn};

use crate::{
    commands::{HELP, UserCommand, parse_command},
    config::ClientConfig,
    render,
};

/// Inbound message types the session consumes.
const SESSION_KINDS: [MessageKind; 7] = [
    MessageKind::ConnectionState,
    MessageKind::TableSnapshot,
    MessageKind::TableStateUpdate,
    MessageKind::TurnPrompt,
    MessageKind::ActionResult,
    MessageKind::ShowdownResult,
    MessageKind::Announcement,
];

/// Whether the loop should keep going after a line of input.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App<W> {
    handle: ConnectionHandle,
    session: TableSession,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    inbound: mpsc::UnboundedReceiver<Envelope<ServerMessage>>,
    started: Instant,
    out: W,
}

/// Watch the configured table over WebSocket until the user quits.
pub async fn run(config: ClientConfig) -> Result<()> {
    App::start(&config, WsConnector, std::io::stdout())
        .await?
        .run()
        .await
}

impl<W: Write> App<W> {
    /// Spawn the connection driver, subscribe the session to its inbound
    /// messages, and start connecting.
    pub async fn start<C>(config: &ClientConfig, connector: C, out: W) -> Result<Self>
    where
        C: Connector + 'static,
    {
        let handle = ConnectionDriver::spawn(config.connection.clone(), connector);

        let (forward, inbound) = mpsc::unbounded_channel();
        for kind in SESSION_KINDS {
            let forward = forward.clone();
            handle
                .on(kind, move |envelope| {
                    forward
                        .send(envelope.clone())
                        .map_err(|_| anyhow!("client loop has stopped"))
                })
                .await
                .context("Failed to register message handler")?;
        }

        let (session, events) = TableSession::new(
            config.table_id,
            config.player.clone(),
            config.presentation.clone(),
        );

        info!("Connecting to {} for table {}", config.server_url, config.table_id);
        handle
            .connect(config.server_url.clone())
            .context("Failed to start connecting")?;

        Ok(Self {
            handle,
            session,
            events,
            inbound,
            started: Instant::now(),
            out,
        })
    }

    pub fn session(&self) -> &TableSession {
        &self.session
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Next inbound envelope. `None` once the driver has stopped.
    pub async fn next_envelope(&mut self) -> Option<Envelope<ServerMessage>> {
        self.inbound.recv().await
    }

    /// When the session next needs [`App::on_timer`].
    pub fn next_deadline(&self) -> Option<Instant> {
        self.session
            .next_deadline()
            .map(|deadline| self.started + Duration::from_millis(deadline))
    }

    pub async fn on_envelope(&mut self, envelope: Envelope<ServerMessage>) -> Result<()> {
        let now = self.now();
        for message in self.session.handle(now, &envelope) {
            self.send(Envelope::new(message)).await?;
        }
        self.flush_events()
    }

    pub async fn on_line(&mut self, line: &str) -> Result<Flow> {
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        match parse_command(line) {
            Ok(UserCommand::TakeAction(action)) => match self.session.request_action(action) {
                Ok(envelope) => self.send(envelope).await?,
                Err(e) => writeln!(self.out, "{e}")?,
            },
            Ok(UserCommand::Leave) => {
                let message = self.session.leave();
                self.send(Envelope::new(message)).await?;
                writeln!(self.out, "Left table {}", self.session.table_id())?;
            }
            Ok(UserCommand::Help) => write!(self.out, "{HELP}")?,
            Ok(UserCommand::Quit) => return Ok(Flow::Quit),
            Err(e) => writeln!(self.out, "{e}")?,
        }

        self.flush_events()?;
        Ok(Flow::Continue)
    }

    /// Run every presentation step that is due.
    pub fn on_timer(&mut self) -> Result<()> {
        let now = self.now();
        self.session.on_timer(now);
        self.flush_events()
    }

    /// Disconnect cleanly and stop the driver.
    pub async fn close(self) -> Result<()> {
        self.handle.disconnect().await?;
        self.handle.shutdown().await?;
        Ok(())
    }

    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        writeln!(self.out, "Type 'help' for commands.")?;

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                envelope = self.inbound.recv() => {
                    let Some(envelope) = envelope else {
                        warn!("Connection driver stopped");
                        break;
                    };
                    self.on_envelope(envelope).await?;
                }

                line = lines.next_line() => {
                    match line.context("Failed to read stdin")? {
                        Some(line) => {
                            if self.on_line(&line).await? == Flow::Quit {
                                break;
                            }
                        }
                        None => {
                            debug!("stdin closed");
                            break;
                        }
                    }
                }

                _ = wait_until(deadline) => self.on_timer()?,

                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        writeln!(self.out, "Disconnecting...")?;
        self.close().await
    }

    async fn send(&self, envelope: Envelope<ClientMessage>) -> Result<()> {
        let kind = envelope.kind();
        match self.handle.send_envelope(envelope).await {
            Ok(outcome) => {
                debug!("{kind}: {outcome:?}");
                Ok(())
            }
            Err(ConnectionError::DriverClosed) => bail!("Connection driver is closed"),
            Err(e) => {
                warn!("Failed to send {kind}: {e}");
                Ok(())
            }
        }
    }

    fn flush_events(&mut self) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            if let SessionEvent::TableUpdated { .. } = event {
                writeln!(self.out, "{}", render::table_view(self.session.state()))?;
            }
            if let Some(line) = render::event_line(&event) {
                writeln!(self.out, "{}", render::timestamped(&line))?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn now(&self) -> Millis {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(Millis::MAX)
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
