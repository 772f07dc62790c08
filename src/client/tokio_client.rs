use std::io::{Read, Write};

use zeroize::Zeroizing;

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::protocol::framing::PacketStream;

/// Run [`authenticate_with_sequence`](super::authenticate_with_sequence) on
/// the tokio blocking pool.
///
/// The exchange itself is blocking I/O over `stream`; this only keeps it off
/// the async worker threads.
pub async fn authenticate_async<S>(
    stream: S,
    seq: u8,
    config: AuthConfig,
    username: impl Into<String>,
    password: impl Into<String>,
    host: impl Into<String>,
) -> Result<PacketStream<S>>
where
    S: Read + Write + Send + 'static,
{
    let username = username.into();
    let password = Zeroizing::new(password.into());
    let host = host.into();

    tokio::task::spawn_blocking(move || {
        super::authenticate_with_sequence(stream, seq, &config, &username, &password, &host)
    })
    .await
    .map_err(|e| AuthError::Transport(format!("authentication task failed: {e}")))?
}
