//! Session orchestration: handshake, negotiation and the multiplexed
//! exchange loop.
//!
//! # Overview
//!
//! ```text
//! Handshaking ──version ok──► Negotiating ──mechanism, N──► Exchanging ─┐
//!      │                           │                          ▲        │
//!      │                           │                          └────────┘
//!      ▼                           ▼                   step / write / read
//!    Failed ◄─────────────────── Failed ◄──── any error ───────┤
//!                                                             ▼
//!                                                  all done after write
//!                                                             │
//!                                                           Done
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mongosql_auth::{AuthConfig, PacketStream, Session};
//!
//! let mut session = Session::new(PacketStream::new(stream), AuthConfig::default());
//! session.start("alice?source=admin", "secret", "db.example.com");
//! while !session.is_done() {
//!     session.step();
//!     session.write_payload();
//!     session.read_payload();
//! }
//! if let Some(msg) = session.error_message() {
//!     eprintln!("authentication failed: {msg}");
//! }
//! ```

use tracing::{Span, debug, trace, warn};

use crate::auth::MechanismKind;
use crate::channel::Channel;
use crate::config::AuthConfig;
use crate::conversation::Conversation;
use crate::error::{AuthError, Result};
use crate::identity::Identity;
use crate::protocol::messages::{
    HANDSHAKE_ACK, check_version, parse_handshake, parse_mechanism_offer,
};
use crate::protocol::multiplex::{Segment, decode_server_payload, encode_client_payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Negotiating,
    Exchanging,
    Done,
    Failed,
}

/// Aggregate outcome reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Ok,
    Error,
}

/// One authentication attempt over one channel.
pub struct Session<C> {
    channel: C,
    config: AuthConfig,
    span: Span,
    state: SessionState,
    mechanism: Option<String>,
    conversations: Vec<Conversation>,
    error: Option<AuthError>,
    rounds: u32,
}

impl<C: Channel> Session<C> {
    pub fn new(channel: C, config: AuthConfig) -> Self {
        Self {
            channel,
            config,
            span: tracing::debug_span!("mongosql_auth"),
            state: SessionState::Handshaking,
            mechanism: None,
            conversations: Vec::new(),
            error: None,
            rounds: 0,
        }
    }

    /// Log under `span` instead of the default `mongosql_auth` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Run handshake and negotiation, then create the conversations.
    ///
    /// Failures are recorded in the session; check [`Session::has_error`].
    pub fn start(&mut self, username: &str, password: &str, host: &str) {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.state != SessionState::Handshaking {
            self.fail(AuthError::MechanismProtocol(
                "session already started".into(),
            ));
            return;
        }
        if let Err(e) = self.handshake().and_then(|()| self.negotiate(username, password, host)) {
            self.fail(e);
            return;
        }
        self.collect_conversation_errors();
    }

    fn handshake(&mut self) -> Result<()> {
        debug!("reading auth-data from server");
        let pkt = self
            .channel
            .read_packet()
            .map_err(|e| transport_context("failed reading auth-data from initial handshake", e))?;

        let server = parse_handshake(&pkt)?;
        let client = self.config.protocol_version;
        debug!(%server, %client, "protocol versions");
        check_version(server, client)?;

        debug!("acknowledging handshake");
        self.channel
            .write_packet(&HANDSHAKE_ACK)
            .map_err(|e| transport_context("failed writing handshake response", e))?;
        self.state = SessionState::Negotiating;
        Ok(())
    }

    fn negotiate(&mut self, username: &str, password: &str, host: &str) -> Result<()> {
        debug!("reading mechanism from server");
        let pkt = self
            .channel
            .read_packet()
            .map_err(|e| transport_context("failed reading mechanism negotiation", e))?;
        let offer = parse_mechanism_offer(&pkt)?;
        debug!(
            mechanism = %offer.mechanism,
            num_conversations = offer.num_conversations,
            "server selected mechanism"
        );
        if offer.num_conversations > self.config.max_conversations {
            return Err(AuthError::Framing(format!(
                "server requested {} conversations, limit is {}",
                offer.num_conversations, self.config.max_conversations
            )));
        }

        let identity = Identity::parse(username, password);
        self.conversations = (0..offer.num_conversations)
            .map(|_| Conversation::new(&offer.mechanism, identity.clone(), host, &self.config))
            .collect();
        self.mechanism = Some(offer.mechanism.to_ascii_uppercase());
        self.state = SessionState::Exchanging;
        Ok(())
    }

    /// Step every conversation once on its current buffer.
    pub fn step(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        if !self.ready("step") {
            return;
        }

        trace!(round = self.rounds, "stepping conversations");
        for conv in &mut self.conversations {
            conv.step();
        }
        self.collect_conversation_errors();
    }

    /// Send every conversation's buffer to the server in one message.
    pub fn write_payload(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        if !self.ready("write payload") {
            return;
        }

        let payload = match encode_client_payload(self.conversations.iter().map(|c| Segment {
            done: c.is_done(),
            payload: c.buffer(),
        })) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        debug!(bytes = payload.len(), round = self.rounds, "writing payload to server");
        if let Err(e) = self.channel.write_packet(&payload) {
            self.fail(transport_context("failed writing client response", e));
            return;
        }
        self.rounds += 1;

        if self.conversations.iter().all(Conversation::is_done) {
            debug!(rounds = self.rounds, "all conversations done");
            self.state = SessionState::Done;
        }
    }

    /// Read one server message and hand each conversation its segment.
    /// Does nothing once the session is done.
    pub fn read_payload(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.is_done() || !self.ready("read payload") {
            return;
        }

        debug!("reading payload from server");
        let pkt = match self.channel.read_packet() {
            Ok(pkt) => pkt,
            Err(e) => {
                self.fail(transport_context("failed reading payload from server", e));
                return;
            }
        };

        let segments = match decode_server_payload(
            pkt,
            self.conversations.len(),
            self.config.max_conversation_buffer,
        ) {
            Ok(segments) => segments,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        for (conv, seg) in self.conversations.iter_mut().zip(segments) {
            conv.receive(&seg);
        }
    }

    /// Drive the whole exchange. Returns the session error, if any.
    pub fn authenticate(&mut self, username: &str, password: &str, host: &str) -> Result<()> {
        self.start(username, password, host);
        while !self.is_done() {
            self.step();
            self.write_payload();
            self.read_payload();
        }
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// True once the session has failed, or every conversation is done.
    pub fn is_done(&self) -> bool {
        match self.state {
            SessionState::Done | SessionState::Failed => true,
            SessionState::Exchanging => {
                self.error.is_some() || self.conversations.iter().all(Conversation::is_done)
            }
            SessionState::Handshaking | SessionState::Negotiating => self.error.is_some(),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&AuthError> {
        self.error.as_ref()
    }

    /// The first recorded error, as shown to users.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn status(&self) -> AuthStatus {
        if self.error.is_some() {
            AuthStatus::Error
        } else {
            AuthStatus::Ok
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Upper-cased mechanism name, once negotiated.
    pub fn mechanism(&self) -> Option<&str> {
        self.mechanism.as_deref()
    }

    pub fn mechanism_kind(&self) -> Option<MechanismKind> {
        self.conversations.first().and_then(Conversation::mechanism_kind)
    }

    pub fn num_conversations(&self) -> usize {
        self.conversations.len()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Messages written in the exchange phase.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    fn ready(&mut self, op: &str) -> bool {
        match self.state {
            SessionState::Exchanging if self.error.is_none() => true,
            SessionState::Handshaking | SessionState::Negotiating if self.error.is_none() => {
                self.fail(AuthError::MechanismProtocol(format!(
                    "{op} called before the session was started"
                )));
                false
            }
            _ => {
                trace!(state = ?self.state, "not going to {op}: session finished");
                false
            }
        }
    }

    /// Promote the first conversation error to the session error.
    fn collect_conversation_errors(&mut self) {
        if self.error.is_some() {
            return;
        }
        let first = self
            .conversations
            .iter()
            .enumerate()
            .find_map(|(i, c)| c.error().map(|e| (i, e.clone())));
        if let Some((index, err)) = first {
            warn!(conversation = index, error = %err, "conversation failed");
            self.fail(err);
        }
    }

    fn fail(&mut self, err: AuthError) {
        if self.error.is_none() {
            debug!(error = %err, "authentication failed");
            self.error = Some(err);
        }
        self.state = SessionState::Failed;
    }
}

/// Prefix transport errors with what the session was doing; other errors
/// pass through untouched.
fn transport_context(what: &str, err: AuthError) -> AuthError {
    match err {
        AuthError::Transport(msg) => AuthError::Transport(format!("{what}: {msg}")),
        other => other,
    }
}
