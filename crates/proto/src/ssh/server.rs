//! Mock SSH server.
//!
//! [`MockServer`] owns the listening socket and spawns one task per
//! accepted connection. Each task runs a [`Session`]: the peer's
//! identification line, ours, then a strict read, dispatch, write loop until
//! the peer leaves, sends DISCONNECT, or sends something the session cannot
//! decode. Sessions share nothing but the read-only configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use mirage_proto::ssh::config::MockServerConfig;
//! use mirage_proto::ssh::server::MockServer;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MockServerConfig::builder()
//!     .with_listen_addr("127.0.0.1:2222")
//!     .build()?;
//! let server = MockServer::bind(config).await?;
//! println!("mock SSH server on {}", server.local_addr()?);
//!
//! server
//!     .serve_with_shutdown(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::ssh::channel::ChannelTable;
use crate::ssh::config::MockServerConfig;
use crate::ssh::dispatcher::{ConnectionContext, MessageDispatcher, NextStep};
use crate::ssh::kex::KeyExchange;
use crate::ssh::logging;
use crate::ssh::transport::{ReadOutcome, Transport};
use crate::ssh::version::Version;
use mirage_platform::{MirageError, MirageResult};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the peer's identification line.
    VersionExchange,
    /// Exchanging packets.
    PacketLoop,
    /// Terminal; no further I/O.
    Closed,
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed or reset the stream.
    PeerClosed,
    /// The peer sent SSH_MSG_DISCONNECT.
    Disconnected,
    /// We sent SSH_MSG_DISCONNECT for an unsupported message.
    PolicyDisconnect,
}

impl SessionEnd {
    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEnd::PeerClosed => "peer closed",
            SessionEnd::Disconnected => "peer disconnected",
            SessionEnd::PolicyDisconnect => "disconnected by policy",
        }
    }
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// How the session ended.
    pub end: SessionEnd,
    /// Packets decoded from the peer.
    pub packets_received: u32,
    /// Packets written to the peer.
    pub packets_sent: u32,
    /// Whether USERAUTH_SUCCESS was sent.
    pub authenticated: bool,
    /// Peer identification line, if one was read.
    pub peer_version: Option<String>,
}

/// One connection's session.
pub struct Session<S> {
    transport: Transport<S>,
    dispatcher: MessageDispatcher,
    ctx: ConnectionContext,
    config: Arc<MockServerConfig>,
    state: SessionState,
    peer_version: Option<String>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a session over `stream`.
    pub fn new(stream: S, config: Arc<MockServerConfig>, peer: impl Into<String>) -> Self {
        Self {
            transport: Transport::new(stream),
            dispatcher: MessageDispatcher::from_config(&config),
            ctx: ConnectionContext::new(config.channel_id_policy, peer),
            config,
            state: SessionState::VersionExchange,
            peer_version: None,
        }
    }

    /// Replaces the [`Cleartext`](crate::ssh::kex::Cleartext) key exchange.
    pub fn with_key_exchange(mut self, kex: Box<dyn KeyExchange>) -> Self {
        self.dispatcher = MessageDispatcher::with_key_exchange(
            self.config.unknown_message_policy,
            self.config.auth_markers.clone(),
            kex,
        );
        self
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Channels currently open.
    pub fn channels(&self) -> &ChannelTable {
        &self.ctx.channels
    }

    /// Whether authentication succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.ctx.authenticated
    }

    /// Runs the session to completion.
    ///
    /// However the session ends, the state becomes [`SessionState::Closed`],
    /// the channel table is cleared and the stream is shut down.
    pub async fn run(&mut self) -> MirageResult<SessionReport> {
        let result = self.drive().await;

        self.state = SessionState::Closed;
        self.ctx.channels.clear();
        if let Err(e) = self.transport.shutdown().await {
            debug!(peer = %self.ctx.peer, error = %e, "Shutdown failed");
        }

        let end = result?;
        Ok(SessionReport {
            end,
            packets_received: self.transport.packets_received(),
            packets_sent: self.transport.packets_sent(),
            authenticated: self.ctx.authenticated,
            peer_version: self.peer_version.clone(),
        })
    }

    async fn drive(&mut self) -> MirageResult<SessionEnd> {
        match self.state {
            SessionState::Closed => {
                return Err(MirageError::Protocol("session already closed".to_string()))
            }
            SessionState::VersionExchange => {
                if let ReadOutcome::Closed = self.exchange_versions().await? {
                    return Ok(SessionEnd::PeerClosed);
                }
                self.state = SessionState::PacketLoop;
            }
            SessionState::PacketLoop => {}
        }

        loop {
            let inbound = match self
                .transport
                .read_packet(self.config.max_packet_length)
                .await?
            {
                ReadOutcome::Data(inbound) => inbound,
                ReadOutcome::Closed => return Ok(SessionEnd::PeerClosed),
            };
            logging::log_packet_received(&self.ctx.peer, inbound.sequence, &inbound.packet);

            let dispatch = self.dispatcher.dispatch(&mut self.ctx, &inbound)?;
            for reply in &dispatch.replies {
                self.transport.write_packet(reply).await?;
                logging::log_packet_sent(&self.ctx.peer, reply);
            }

            match dispatch.next {
                NextStep::Continue => {}
                NextStep::PeerDisconnected(_) => return Ok(SessionEnd::Disconnected),
                NextStep::PolicyDisconnect => return Ok(SessionEnd::PolicyDisconnect),
            }
        }
    }

    async fn exchange_versions(&mut self) -> MirageResult<ReadOutcome<()>> {
        let line = match self
            .transport
            .read_identification(self.config.max_identification_length)
            .await?
        {
            ReadOutcome::Data(line) => line,
            ReadOutcome::Closed => return Ok(ReadOutcome::Closed),
        };

        // Any line is accepted; parsing only feeds the log.
        let parsed = Version::parse(&line).ok();
        logging::log_version_exchanged(
            &self.ctx.peer,
            &line,
            parsed.as_ref().map(|v| v.software()),
        );
        self.peer_version = Some(line);

        let ours = Version::new(&self.config.server_version, None);
        self.transport
            .write_identification(&ours.to_wire_format())
            .await?;

        Ok(ReadOutcome::Data(()))
    }
}

/// Runs one connection to completion and logs the outcome.
///
/// This is the worker boundary: errors stop here and are only logged.
pub async fn handle_stream<S>(
    stream: S,
    config: Arc<MockServerConfig>,
    peer: String,
) -> Option<SessionReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    logging::log_connection_open(&peer);
    let mut session = Session::new(stream, config, peer.clone());

    match session.run().await {
        Ok(report) => {
            logging::log_connection_closed(
                &peer,
                report.end.as_str(),
                report.packets_received,
                report.packets_sent,
            );
            Some(report)
        }
        Err(e) => {
            logging::log_connection_failed(&peer, &e);
            None
        }
    }
}

/// Listening mock server.
#[derive(Debug)]
pub struct MockServer {
    listener: TcpListener,
    config: Arc<MockServerConfig>,
}

impl MockServer {
    /// Validates `config` and binds its listen address.
    pub async fn bind(config: MockServerConfig) -> MirageResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(&config.listen_addr).await?;
        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> MirageResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Server configuration.
    pub fn config(&self) -> &MockServerConfig {
        &self.config
    }

    /// Accepts one connection without running it.
    pub async fn accept(&self) -> MirageResult<(TcpStream, SocketAddr)> {
        Ok(self.listener.accept().await?)
    }

    /// Serves connections until the process exits.
    pub async fn serve(self) -> MirageResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serves connections until `shutdown` resolves.
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> MirageResult<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Mock SSH server listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(addr = %addr, "Shutting down listener");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let config = Arc::clone(&self.config);
                        tokio::spawn(async move {
                            handle_stream(stream, config, peer.to_string()).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
            }
        }
    }
}
