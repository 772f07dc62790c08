//! GSSAPI (Kerberos) conversation on top of a pluggable security-context
//! backend.
//!
//! The crate does not talk to the platform security libraries itself.
//! Applications hand in a [`ContextProvider`] (e.g. one backed by MIT/Heimdal
//! GSSAPI on Unix, another by SSPI on Windows) through
//! [`AuthConfig::context_provider`](crate::config::AuthConfig::context_provider);
//! the conversation only sees the [`SecurityContext`] trait.
//!
//! # States
//!
//! ```text
//! Start ──negotiate: continue──► Start
//!   │
//!   └─────negotiate: complete──► ContextComplete ──wrap(qop ++ user)──► Done
//! ```

use std::fmt;

use super::Step;
use crate::error::{AuthError, Result};
use crate::identity::{Identity, SERVICE_NAME_PARAM};

/// Security layer preamble: no security layer, max message size 0.
pub const QOP_NO_SECURITY: [u8; 4] = [1, 0, 0, 0];

/// Outcome of one `negotiate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// More server input is needed; send this token.
    Continue(Vec<u8>),
    /// The context is established; send this (possibly empty) final token.
    Complete(Vec<u8>),
}

/// An established-or-establishing security context for one conversation.
pub trait SecurityContext: Send {
    /// Feed the server token (empty on the first call) into context
    /// establishment.
    fn negotiate(&mut self, input: &[u8]) -> Result<Negotiation>;

    /// Display name of the authenticated client principal.
    fn username(&mut self) -> Result<String>;

    /// Integrity-wrap `message` under the established context.
    fn wrap(&mut self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Factory for security contexts. One context is created per conversation.
pub trait ContextProvider: fmt::Debug + Send + Sync {
    /// Acquire credentials for `username` and prepare a context targeting
    /// `target_spn` (`service@host`). `password` is `None` when the default
    /// credential cache should be used.
    fn init(
        &self,
        username: &str,
        password: Option<&str>,
        target_spn: &str,
    ) -> Result<Box<dyn SecurityContext>>;
}

/// Target principal for `host`, honoring a `serviceName` username parameter.
pub fn target_principal(identity: &Identity, host: &str, default_service: &str) -> String {
    let service = identity
        .param(SERVICE_NAME_PARAM)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_service);
    format!("{service}@{host}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GssapiState {
    Start,
    ContextComplete,
    Done,
}

pub struct GssapiClient {
    context: Box<dyn SecurityContext>,
    state: GssapiState,
    target_spn: String,
}

impl fmt::Debug for GssapiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GssapiClient")
            .field("state", &self.state)
            .field("target_spn", &self.target_spn)
            .finish_non_exhaustive()
    }
}

impl GssapiClient {
    pub fn new(
        provider: &dyn ContextProvider,
        identity: &Identity,
        host: &str,
        default_service: &str,
    ) -> Result<Self> {
        let target_spn = target_principal(identity, host, default_service);
        let password = Some(identity.password()).filter(|p| !p.is_empty());
        tracing::debug!(user = identity.username(), spn = %target_spn, "initializing GSSAPI client");
        let context = provider.init(identity.username(), password, &target_spn)?;
        Ok(Self::with_context(context, target_spn))
    }

    pub fn with_context(context: Box<dyn SecurityContext>, target_spn: String) -> Self {
        Self {
            context,
            state: GssapiState::Start,
            target_spn,
        }
    }

    pub fn state(&self) -> GssapiState {
        self.state
    }

    pub fn target_spn(&self) -> &str {
        &self.target_spn
    }

    pub fn step(&mut self, input: &[u8]) -> Result<Step> {
        match self.state {
            GssapiState::Start => match self.context.negotiate(input)? {
                Negotiation::Continue(out) => {
                    tracing::trace!("GSSAPI negotiation needs another round");
                    Ok(Step::pending(out))
                }
                Negotiation::Complete(out) => {
                    tracing::trace!("GSSAPI context established");
                    self.state = GssapiState::ContextComplete;
                    Ok(Step::pending(out))
                }
            },
            GssapiState::ContextComplete => {
                let user = self.context.username()?;
                let mut msg = Vec::with_capacity(QOP_NO_SECURITY.len() + user.len());
                msg.extend_from_slice(&QOP_NO_SECURITY);
                msg.extend_from_slice(user.as_bytes());
                let token = self.context.wrap(&msg)?;
                self.state = GssapiState::Done;
                Ok(Step::complete(token))
            }
            GssapiState::Done => Err(AuthError::MechanismProtocol(
                "GSSAPI conversation stepped after completion".into(),
            )),
        }
    }
}
