//! Mock protocol policy.
//!
//! [`MessageDispatcher`] maps one inbound packet to the packets the mock
//! sends back, in order, plus whether the session continues. It touches
//! nothing but the issuing connection's [`ConnectionContext`], so one
//! dispatcher per connection is all the state a session needs.
//!
//! | Inbound                | Replies                                              |
//! |------------------------|------------------------------------------------------|
//! | KEXINIT                | KEXINIT from the [`KeyExchange`]                     |
//! | NEWKEYS                | NEWKEYS from the [`KeyExchange`]                     |
//! | SERVICE_REQUEST        | SERVICE_ACCEPT `ssh-userauth`                        |
//! | USERAUTH_REQUEST       | PK_OK for a probe, SUCCESS otherwise                 |
//! | CHANNEL_OPEN           | OPEN_CONFIRMATION                                    |
//! | CHANNEL_REQUEST        | SUCCESS if wanted; exec adds exit-status and CLOSE   |
//! | CHANNEL_DATA           | the same data on the same channel                    |
//! | CHANNEL_CLOSE          | nothing                                              |
//! | DISCONNECT             | nothing, session ends                                |
//! | IGNORE, DEBUG, ...     | nothing                                              |
//! | anything else          | per [`UnknownMessagePolicy`]                         |

use crate::ssh::auth::{
    auth_success, classify, user_name_hint, AuthKind, AuthMarkers, AuthPkOk, ServiceAccept,
    ServiceRequest, USERAUTH_SERVICE,
};
use crate::ssh::channel::{ChannelIdPolicy, ChannelTable};
use crate::ssh::config::{MockServerConfig, UnknownMessagePolicy};
use crate::ssh::connection::{
    ChannelClose, ChannelData, ChannelOpen, ChannelOpenConfirmation, ChannelRequest,
    ChannelSuccess, CHANNEL_MAX_PACKET, CHANNEL_WINDOW_SIZE,
};
use crate::ssh::kex::{Cleartext, KeyExchange};
use crate::ssh::message::{describe, MessageType};
use crate::ssh::packet::Packet;
use crate::ssh::transport::{
    Disconnect, InboundPacket, Unimplemented, DISCONNECT_PROTOCOL_ERROR,
};
use mirage_platform::MirageResult;
use tracing::{debug, info};

/// State owned by one connection.
#[derive(Debug)]
pub struct ConnectionContext {
    /// Channels opened by the peer.
    pub channels: ChannelTable,
    /// Set once USERAUTH_SUCCESS has been sent.
    pub authenticated: bool,
    /// Peer label for logs.
    pub peer: String,
}

impl ConnectionContext {
    /// Creates an empty context.
    pub fn new(policy: ChannelIdPolicy, peer: impl Into<String>) -> Self {
        Self {
            channels: ChannelTable::new(policy),
            authenticated: false,
            peer: peer.into(),
        }
    }
}

/// What the session does after sending the replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Read the next packet.
    Continue,
    /// The peer sent DISCONNECT.
    PeerDisconnected(Disconnect),
    /// The unknown-message policy ended the session.
    PolicyDisconnect,
}

/// Outcome of dispatching one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Packets to send, in order.
    pub replies: Vec<Packet>,
    /// What to do afterwards.
    pub next: NextStep,
}

impl Dispatch {
    fn reply(packet: Packet) -> Self {
        Self::replies(vec![packet])
    }

    fn replies(replies: Vec<Packet>) -> Self {
        Self {
            replies,
            next: NextStep::Continue,
        }
    }

    fn silent() -> Self {
        Self::replies(Vec::new())
    }
}

/// Per-connection message dispatcher.
pub struct MessageDispatcher {
    unknown_policy: UnknownMessagePolicy,
    markers: AuthMarkers,
    kex: Box<dyn KeyExchange>,
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("unknown_policy", &self.unknown_policy)
            .field("markers", &self.markers)
            .field("kex", &self.kex.name())
            .finish()
    }
}

impl MessageDispatcher {
    /// Creates a dispatcher with the [`Cleartext`] key exchange.
    pub fn new(unknown_policy: UnknownMessagePolicy, markers: AuthMarkers) -> Self {
        Self::with_key_exchange(unknown_policy, markers, Box::new(Cleartext::new()))
    }

    /// Creates a dispatcher with a custom key exchange.
    pub fn with_key_exchange(
        unknown_policy: UnknownMessagePolicy,
        markers: AuthMarkers,
        kex: Box<dyn KeyExchange>,
    ) -> Self {
        Self {
            unknown_policy,
            markers,
            kex,
        }
    }

    /// Creates a dispatcher from server configuration.
    pub fn from_config(config: &MockServerConfig) -> Self {
        Self::new(config.unknown_message_policy, config.auth_markers.clone())
    }

    /// Key exchange in use.
    pub fn key_exchange(&self) -> &dyn KeyExchange {
        self.kex.as_ref()
    }

    /// Dispatches one inbound packet.
    ///
    /// Errors mean the payload was malformed; the caller ends the session.
    pub fn dispatch(
        &mut self,
        ctx: &mut ConnectionContext,
        inbound: &InboundPacket,
    ) -> MirageResult<Dispatch> {
        let packet = &inbound.packet;
        let payload = packet.payload();

        let kind = match packet.kind() {
            Some(kind) => kind,
            None => return Ok(self.unknown(ctx, inbound)),
        };

        match kind {
            MessageType::KexInit => {
                let reply = self.kex.kex_init_reply(payload)?;
                debug!(peer = %ctx.peer, kex = self.kex.name(), "KEXINIT answered");
                Ok(Dispatch::reply(Packet::new(MessageType::KexInit, reply)))
            }
            MessageType::NewKeys => {
                let reply = self.kex.new_keys()?;
                Ok(Dispatch::reply(Packet::new(MessageType::NewKeys, reply)))
            }
            MessageType::ServiceRequest => {
                // The reply never depends on the requested name, so an
                // unreadable one is logged and still accepted.
                let requested = match ServiceRequest::from_payload(payload) {
                    Ok(req) => req.service_name().to_string(),
                    Err(err) => {
                        debug!(peer = %ctx.peer, error = %err, "Unreadable service name");
                        String::new()
                    }
                };
                debug!(peer = %ctx.peer, service = %requested, "Service request");
                Ok(Dispatch::reply(ServiceAccept::new(USERAUTH_SERVICE).to_packet()))
            }
            MessageType::UserauthRequest => Ok(self.userauth(ctx, payload)),
            MessageType::ChannelOpen => {
                let open = ChannelOpen::from_payload(payload)?;
                let sender = open.sender_channel();
                let local = ctx.channels.open(sender);
                info!(
                    peer = %ctx.peer,
                    channel_type = open.channel_type(),
                    channel = sender,
                    local_channel = local,
                    "Channel opened"
                );
                let confirm = ChannelOpenConfirmation::new(
                    sender,
                    local,
                    CHANNEL_WINDOW_SIZE,
                    CHANNEL_MAX_PACKET,
                );
                Ok(Dispatch::reply(confirm.to_packet()))
            }
            MessageType::ChannelRequest => Self::channel_request(ctx, payload),
            MessageType::ChannelData => {
                let data = ChannelData::from_payload(payload)?;
                let recipient = data.recipient_channel();
                if ctx.channels.lookup(recipient).is_none() {
                    debug!(peer = %ctx.peer, channel = recipient, "Data on unknown channel");
                }
                debug!(peer = %ctx.peer, channel = recipient, len = data.data().len(), "Echoing data");
                Ok(Dispatch::reply(
                    ChannelData::new(recipient, data.into_data()).to_packet(),
                ))
            }
            MessageType::ChannelClose => {
                let close = ChannelClose::from_payload(payload)?;
                let recipient = close.recipient_channel();
                match ctx.channels.close(recipient) {
                    Some(_) => info!(peer = %ctx.peer, channel = recipient, "Channel closed by peer"),
                    None => debug!(peer = %ctx.peer, channel = recipient, "Close for unknown channel"),
                }
                Ok(Dispatch::silent())
            }
            MessageType::Disconnect => {
                let disconnect = Disconnect::from_payload(payload)?;
                info!(
                    peer = %ctx.peer,
                    reason = disconnect.reason_code(),
                    description = disconnect.description(),
                    "Peer disconnected"
                );
                Ok(Dispatch {
                    replies: Vec::new(),
                    next: NextStep::PeerDisconnected(disconnect),
                })
            }
            kind if kind.is_silent() => {
                debug!(peer = %ctx.peer, msg_type = %kind, "Consumed without reply");
                Ok(Dispatch::silent())
            }
            _ => Ok(self.unknown(ctx, inbound)),
        }
    }

    fn userauth(&mut self, ctx: &mut ConnectionContext, payload: &[u8]) -> Dispatch {
        let kind = classify(payload, &self.markers);
        let user = user_name_hint(payload).unwrap_or_default();
        debug!(peer = %ctx.peer, user = %user, kind = ?kind, "Authentication request");

        match kind {
            AuthKind::PublicKeyProbe => Dispatch::reply(AuthPkOk::mock().to_packet()),
            AuthKind::SignedRequest | AuthKind::Generic => {
                if !ctx.authenticated {
                    info!(peer = %ctx.peer, user = %user, "Authenticated");
                }
                ctx.authenticated = true;
                Dispatch::reply(auth_success())
            }
        }
    }

    fn channel_request(ctx: &mut ConnectionContext, payload: &[u8]) -> MirageResult<Dispatch> {
        let request = ChannelRequest::from_payload(payload)?;
        let recipient = request.recipient_channel();
        let mut replies = Vec::new();

        if request.want_reply() {
            replies.push(ChannelSuccess::new(recipient).to_packet());
        }

        if request.is_exec() {
            info!(
                peer = %ctx.peer,
                channel = recipient,
                command = %request.exec_command().unwrap_or_default(),
                "Exec request"
            );
            replies.push(ChannelRequest::exit_status(recipient, 0).to_packet());
            replies.push(ChannelClose::new(recipient).to_packet());
            ctx.channels.close(recipient);
        } else {
            debug!(
                peer = %ctx.peer,
                channel = recipient,
                request = request.request_type(),
                want_reply = request.want_reply(),
                "Channel request"
            );
        }

        Ok(Dispatch::replies(replies))
    }

    fn unknown(&self, ctx: &ConnectionContext, inbound: &InboundPacket) -> Dispatch {
        let msg_type = describe(inbound.packet.message_type());
        match self.unknown_policy {
            UnknownMessagePolicy::Ignore => {
                debug!(peer = %ctx.peer, msg_type = %msg_type, "Ignoring unsupported message");
                Dispatch::silent()
            }
            UnknownMessagePolicy::Unimplemented => {
                debug!(
                    peer = %ctx.peer,
                    msg_type = %msg_type,
                    seq = inbound.sequence,
                    "Replying UNIMPLEMENTED"
                );
                Dispatch::reply(Unimplemented::new(inbound.sequence).to_packet())
            }
            UnknownMessagePolicy::Disconnect => {
                info!(peer = %ctx.peer, msg_type = %msg_type, "Disconnecting on unsupported message");
                Dispatch {
                    replies: vec![Disconnect::new(
                        DISCONNECT_PROTOCOL_ERROR,
                        format!("unsupported message {}", msg_type),
                    )
                    .to_packet()],
                    next: NextStep::PolicyDisconnect,
                }
            }
        }
    }
}
