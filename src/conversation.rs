use zeroize::Zeroize;

use crate::auth::{Mechanism, MechanismKind};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::identity::Identity;

/// One mechanism instance and its current exchange buffer.
///
/// A conversation is steppable until it is done or has failed. Errors are
/// sticky: the first one is kept, later ones are dropped.
#[derive(Debug)]
pub struct Conversation {
    mechanism_name: String,
    mechanism: Option<Mechanism>,
    identity: Identity,
    done: bool,
    buffer: Vec<u8>,
    error: Option<AuthError>,
}

impl Conversation {
    /// Build a conversation for the server-named `mechanism`.
    ///
    /// The name is case-folded to upper case. An unknown name, or a mechanism
    /// that fails to initialize, leaves the conversation in its error state.
    pub fn new(mechanism: &str, identity: Identity, host: &str, config: &AuthConfig) -> Self {
        let mechanism_name = mechanism.to_ascii_uppercase();
        let (mechanism, error) = match Mechanism::new(&mechanism_name, &identity, host, config) {
            Ok(m) => (Some(m), None),
            Err(e) => {
                tracing::debug!(mechanism = %mechanism_name, error = %e, "mechanism init failed");
                (None, Some(e))
            }
        };

        Self {
            mechanism_name,
            mechanism,
            identity,
            done: false,
            buffer: Vec::new(),
            error,
        }
    }

    /// Run one mechanism step on the current buffer.
    pub fn step(&mut self) {
        if self.done {
            tracing::trace!("not stepping conversation: already done");
            return;
        }
        if self.error.is_some() {
            tracing::trace!("not stepping conversation: error already encountered");
            return;
        }
        let Some(mechanism) = self.mechanism.as_mut() else {
            return;
        };

        tracing::trace!(
            mechanism = %self.mechanism_name,
            server_len = self.buffer.len(),
            "stepping conversation"
        );
        match mechanism.step(&self.identity, &self.buffer) {
            Ok(step) => {
                self.replace_buffer(step.output);
                self.done = step.done;
                tracing::trace!(
                    done = self.done,
                    client_len = self.buffer.len(),
                    "conversation stepped"
                );
            }
            Err(e) => {
                tracing::debug!(mechanism = %self.mechanism_name, error = %e, "conversation failed");
                self.set_error(e);
            }
        }
    }

    /// Install the server's next message for this conversation.
    pub fn receive(&mut self, payload: &[u8]) {
        self.replace_buffer(payload.to_vec());
    }

    /// Record `err` unless an error is already recorded.
    pub fn set_error(&mut self, err: AuthError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&AuthError> {
        self.error.as_ref()
    }

    /// Current exchange buffer: the last client output, or the last server
    /// message once one has been received.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Upper-cased mechanism name.
    pub fn mechanism_name(&self) -> &str {
        &self.mechanism_name
    }

    pub fn mechanism_kind(&self) -> Option<MechanismKind> {
        self.mechanism.as_ref().map(Mechanism::kind)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn replace_buffer(&mut self, next: Vec<u8>) {
        let mut prev = std::mem::replace(&mut self.buffer, next);
        prev.zeroize();
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        // PLAIN leaves the password in the buffer
        self.buffer.zeroize();
    }
}
