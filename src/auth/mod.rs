//! Authentication mechanisms a conversation can run.
//!
//! The server names one mechanism for the whole session:
//!
//! - **SCRAM-SHA-1**, **SCRAM-SHA-256** (feature: `scram`): salted
//!   challenge/response, three steps, mutual authentication.
//! - **PLAIN**: username and password in one message.
//! - **GSSAPI**: Kerberos through an application-supplied
//!   [`ContextProvider`](gssapi::ContextProvider).
//!
//! # Feature Flags
//!
//! - `scram`: Enables the SCRAM mechanisms. Adds dependencies on `sha1`,
//!   `sha2`, `hmac`, `md5`, `rand`, and `base64`. Without it, a server
//!   asking for SCRAM fails the session with an unsupported-mechanism error.

use std::fmt;

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::identity::Identity;

pub mod gssapi;
pub mod plain;
pub mod scram;

pub use gssapi::{ContextProvider, GssapiClient, Negotiation, SecurityContext};
pub use plain::PlainClient;
#[cfg(feature = "scram")]
pub use scram::ScramClient;
pub use scram::ScramVersion;

/// Output of one mechanism step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Bytes for the server
    pub output: Vec<u8>,
    /// No further steps are expected from this mechanism
    pub done: bool,
}

impl Step {
    pub fn pending(output: Vec<u8>) -> Self {
        Self {
            output,
            done: false,
        }
    }

    pub fn complete(output: Vec<u8>) -> Self {
        Self { output, done: true }
    }
}

/// The mechanisms this client knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MechanismKind {
    Scram(ScramVersion),
    Plain,
    Gssapi,
}

impl MechanismKind {
    /// Look up an upper-cased mechanism name.
    pub fn from_name(name: &str) -> Option<MechanismKind> {
        match name {
            "SCRAM-SHA-1" => Some(MechanismKind::Scram(ScramVersion::Sha1)),
            "SCRAM-SHA-256" => Some(MechanismKind::Scram(ScramVersion::Sha256)),
            "PLAIN" => Some(MechanismKind::Plain),
            "GSSAPI" => Some(MechanismKind::Gssapi),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MechanismKind::Scram(v) => v.mechanism(),
            MechanismKind::Plain => "PLAIN",
            MechanismKind::Gssapi => "GSSAPI",
        }
    }
}

impl fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mechanism state for one conversation.
#[derive(Debug)]
pub enum Mechanism {
    #[cfg(feature = "scram")]
    Scram(ScramClient),
    Plain(PlainClient),
    Gssapi(GssapiClient),
}

impl Mechanism {
    /// Select and initialize a mechanism by (already upper-cased) name.
    pub fn new(name: &str, identity: &Identity, host: &str, config: &AuthConfig) -> Result<Self> {
        let kind = MechanismKind::from_name(name)
            .ok_or_else(|| AuthError::UnsupportedMechanism(name.to_string()))?;

        match kind {
            #[cfg(feature = "scram")]
            MechanismKind::Scram(version) => Ok(Mechanism::Scram(
                ScramClient::new(version).with_max_iterations(config.max_scram_iterations),
            )),
            #[cfg(not(feature = "scram"))]
            MechanismKind::Scram(_) => Err(AuthError::UnsupportedMechanism(format!(
                "{name} (scram feature disabled)"
            ))),
            MechanismKind::Plain => Ok(Mechanism::Plain(PlainClient::new())),
            MechanismKind::Gssapi => {
                let provider = config.context_provider.as_deref().ok_or_else(|| {
                    AuthError::UnsupportedMechanism(format!(
                        "{name} (no security context provider configured)"
                    ))
                })?;
                let client = GssapiClient::new(provider, identity, host, &config.service_name)?;
                Ok(Mechanism::Gssapi(client))
            }
        }
    }

    pub fn kind(&self) -> MechanismKind {
        match self {
            #[cfg(feature = "scram")]
            Mechanism::Scram(c) => MechanismKind::Scram(c.version()),
            Mechanism::Plain(_) => MechanismKind::Plain,
            Mechanism::Gssapi(_) => MechanismKind::Gssapi,
        }
    }

    pub fn step(&mut self, identity: &Identity, input: &[u8]) -> Result<Step> {
        match self {
            #[cfg(feature = "scram")]
            Mechanism::Scram(c) => c.step(identity, input),
            Mechanism::Plain(c) => c.step(identity, input),
            Mechanism::Gssapi(c) => c.step(input),
        }
    }
}
