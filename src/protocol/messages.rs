use bytes::Buf;

use crate::config::ProtocolVersion;
use crate::error::{AuthError, Result};

/// The client's reply to the version handshake: a single zero byte.
pub const HANDSHAKE_ACK: [u8; 1] = [0];

/// Mechanism announcement sent by the server after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MechanismOffer {
    /// Name as sent by the server; not yet case-folded.
    pub mechanism: String,
    pub num_conversations: u32,
}

/// Parse the server's `[major:u8][minor:u8]` auth-data.
pub fn parse_handshake(payload: &[u8]) -> Result<ProtocolVersion> {
    if payload.len() < 2 {
        return Err(AuthError::Framing(format!(
            "handshake too short: {} bytes (need 2)",
            payload.len()
        )));
    }
    Ok(ProtocolVersion {
        major: payload[0],
        minor: payload[1],
    })
}

/// Reject any server version other than exactly `client`.
pub fn check_version(server: ProtocolVersion, client: ProtocolVersion) -> Result<()> {
    if server != client {
        return Err(AuthError::VersionMismatch {
            server_major: server.major,
            server_minor: server.minor,
            client_major: client.major,
            client_minor: client.minor,
        });
    }
    Ok(())
}

/// Parse `[mechanism\0][num_conversations:u32 LE]`.
pub fn parse_mechanism_offer(payload: &[u8]) -> Result<MechanismOffer> {
    let nul = payload
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| AuthError::Framing("mechanism name is not NUL-terminated".into()))?;

    let mechanism = std::str::from_utf8(&payload[..nul])
        .map_err(|e| AuthError::Framing(format!("mechanism name is not valid UTF-8: {e}")))?
        .to_string();

    let mut rest = &payload[nul + 1..];
    if rest.remaining() < 4 {
        return Err(AuthError::Framing(format!(
            "conversation count truncated: {} bytes (need 4)",
            rest.remaining()
        )));
    }
    let num_conversations = rest.get_u32_le();
    if num_conversations == 0 {
        return Err(AuthError::Framing(
            "server requested zero conversations".into(),
        ));
    }

    Ok(MechanismOffer {
        mechanism,
        num_conversations,
    })
}
