//! Error types for mongosql-auth.
//!
//! All errors in this crate are represented by [`AuthError`], which covers:
//! - Transport errors (the packet channel failed to read or write)
//! - Protocol errors (version mismatch, malformed or oversized frames)
//! - Mechanism errors (unknown mechanism, failed server proof, illegal step)
//! - Credential errors (credentials that cannot be encoded for the mechanism)
//!
//! Every variant is terminal for the current authentication attempt.

use thiserror::Error;

/// Error type for all mongosql-auth operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Channel read/write failure.
    ///
    /// Note: `std::io::Error` is not `Clone`, so we store the message.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server speaks a different auth protocol version.
    #[error(
        "server protocol version {server_major}.{server_minor} incompatible with client protocol version {client_major}.{client_minor}"
    )]
    VersionMismatch {
        server_major: u8,
        server_minor: u8,
        client_major: u8,
        client_minor: u8,
    },

    /// Malformed, truncated or oversized frame.
    #[error("framing error: {0}")]
    Framing(String),

    /// The negotiated mechanism is unknown or not enabled in this build.
    #[error("unsupported mechanism '{0}'")]
    UnsupportedMechanism(String),

    /// The server failed to prove itself, or reported an auth failure.
    #[error("verification failed: {0}")]
    Verification(String),

    /// The mechanism was driven in a way its state machine does not allow,
    /// or the server sent a message the mechanism cannot interpret.
    #[error("mechanism protocol error: {0}")]
    MechanismProtocol(String),

    /// Credentials cannot be represented for the selected mechanism.
    #[error("credential encoding error: {0}")]
    CredentialEncoding(String),
}

impl AuthError {
    /// Returns `true` if this is a transport error.
    #[inline]
    pub fn is_transport(&self) -> bool {
        matches!(self, AuthError::Transport(_))
    }

    /// Returns `true` if the server and client disagree on the protocol version.
    #[inline]
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, AuthError::VersionMismatch { .. })
    }

    /// Returns `true` if this is a framing error.
    #[inline]
    pub fn is_framing(&self) -> bool {
        matches!(self, AuthError::Framing(_))
    }

    /// Returns `true` if the error came out of a mechanism rather than the wire.
    pub fn is_mechanism(&self) -> bool {
        matches!(
            self,
            AuthError::UnsupportedMechanism(_)
                | AuthError::Verification(_)
                | AuthError::MechanismProtocol(_)
                | AuthError::CredentialEncoding(_)
        )
    }
}

// Manual From impl since io::Error isn't Clone
impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        AuthError::Transport(err.to_string())
    }
}

/// Result type alias for mongosql-auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
