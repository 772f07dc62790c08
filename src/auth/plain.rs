//! SASL PLAIN (RFC 4616) without an authorization identity.

use super::Step;
use crate::error::{AuthError, Result};
use crate::identity::Identity;

#[derive(Debug, Default)]
pub struct PlainClient;

impl PlainClient {
    pub fn new() -> Self {
        PlainClient
    }

    /// Emit `\0username\0password`, whatever the server sent.
    pub fn step(&mut self, identity: &Identity, _input: &[u8]) -> Result<Step> {
        let user = identity.username();
        let pass = identity.password();
        if user.contains('\0') || pass.contains('\0') {
            return Err(AuthError::CredentialEncoding(
                "PLAIN credentials must not contain NUL".into(),
            ));
        }

        let mut out = Vec::with_capacity(user.len() + pass.len() + 2);
        out.push(0);
        out.extend_from_slice(user.as_bytes());
        out.push(0);
        out.extend_from_slice(pass.as_bytes());
        Ok(Step::complete(out))
    }
}
