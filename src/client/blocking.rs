use std::io::{Read, Write};

use crate::config::AuthConfig;
use crate::error::Result;
use crate::protocol::framing::PacketStream;
use crate::session::Session;

/// Authenticate over `stream`, starting at packet sequence id 0.
///
/// On success the packet stream is handed back so the caller can carry on
/// with the connection.
pub fn authenticate<S: Read + Write>(
    stream: S,
    config: &AuthConfig,
    username: &str,
    password: &str,
    host: &str,
) -> Result<PacketStream<S>> {
    authenticate_with_sequence(stream, 0, config, username, password, host)
}

/// Like [`authenticate`], for a stream already `seq` packets into the
/// MySQL handshake.
pub fn authenticate_with_sequence<S: Read + Write>(
    stream: S,
    seq: u8,
    config: &AuthConfig,
    username: &str,
    password: &str,
    host: &str,
) -> Result<PacketStream<S>> {
    let span = tracing::debug_span!("mongosql_auth", host, user = username_only(username));
    let packets =
        PacketStream::with_sequence(stream, seq).with_max_packet(config.max_server_payload());
    let mut session = Session::new(packets, config.clone()).with_span(span);

    session.authenticate(username, password, host)?;
    tracing::debug!(
        mechanism = session.mechanism().unwrap_or_default(),
        conversations = session.num_conversations(),
        rounds = session.rounds(),
        "authentication complete"
    );
    Ok(session.into_channel())
}

/// Username with any `?key=value` parameters removed, for logging.
fn username_only(username: &str) -> &str {
    username.split_once('?').map_or(username, |(user, _)| user)
}
