//! SCRAM-SHA-1 / SCRAM-SHA-256 client conversation.
//!
//! Implements the client side of RFC 5802 (and RFC 7677 for SHA-256) as a
//! three-step state machine driven by the server's messages:
//!
//! | step | input            | output             |
//! |------|------------------|--------------------|
//! | 0    | ignored          | client-first       |
//! | 1    | server-first     | client-final       |
//! | 2    | server-final     | empty, done        |
//!
//! # Password preparation
//!
//! SCRAM-SHA-1 follows the MongoDB convention: the password fed into `Hi()`
//! is `hex(md5("<user>:mongo:<password>"))`. SCRAM-SHA-256 uses the password
//! as given (no SASLprep).

#[cfg(feature = "scram")]
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
#[cfg(feature = "scram")]
use hmac::{Hmac, Mac, digest::KeyInit};
#[cfg(feature = "scram")]
use rand::RngCore;
#[cfg(feature = "scram")]
use sha1::Sha1;
#[cfg(feature = "scram")]
use sha2::{Digest, Sha256};
#[cfg(feature = "scram")]
use zeroize::{Zeroize, Zeroizing};

#[cfg(feature = "scram")]
use super::Step;
#[cfg(feature = "scram")]
use crate::config::DEFAULT_MAX_SCRAM_ITERATIONS;
#[cfg(feature = "scram")]
use crate::error::{AuthError, Result};
#[cfg(feature = "scram")]
use crate::identity::Identity;

/// Raw client nonce length; base64-encoded on the wire.
#[cfg(feature = "scram")]
const NONCE_LEN: usize = 24;

/// Hash strength of a SCRAM conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScramVersion {
    Sha1,
    Sha256,
}

impl ScramVersion {
    pub fn mechanism(&self) -> &'static str {
        match self {
            ScramVersion::Sha1 => "SCRAM-SHA-1",
            ScramVersion::Sha256 => "SCRAM-SHA-256",
        }
    }
}

#[cfg(feature = "scram")]
impl ScramVersion {
    /// HMAC() from RFC 5802 with this version's hash.
    pub fn hmac(&self, key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
        match self {
            ScramVersion::Sha1 => mac::<Hmac<Sha1>>(key, msg),
            ScramVersion::Sha256 => mac::<Hmac<Sha256>>(key, msg),
        }
    }

    /// H() from RFC 5802.
    pub fn h(&self, msg: &[u8]) -> Vec<u8> {
        match self {
            ScramVersion::Sha1 => Sha1::digest(msg).to_vec(),
            ScramVersion::Sha256 => Sha256::digest(msg).to_vec(),
        }
    }

    /// Hi() from RFC 5802 - essentially PBKDF2 with HMAC as the PRF.
    pub fn hi(&self, password: &[u8], salt: &[u8], iters: u32) -> Result<Zeroizing<Vec<u8>>> {
        // U1 = HMAC(password, salt || INT(1))
        let mut s1 = Vec::with_capacity(salt.len() + 4);
        s1.extend_from_slice(salt);
        s1.extend_from_slice(&1u32.to_be_bytes());

        let mut u = Zeroizing::new(self.hmac(password, &s1)?);
        let mut out = Zeroizing::new(u.to_vec());

        // Ui = HMAC(password, U(i-1)), result = U1 XOR U2 XOR ... XOR Ui
        for _ in 1..iters {
            u = Zeroizing::new(self.hmac(password, &u)?);
            for (o, ui) in out.iter_mut().zip(u.iter()) {
                *o ^= *ui;
            }
        }

        Ok(out)
    }

    /// The password as it enters `Hi()`.
    pub fn prepare_password(&self, username: &str, password: &str) -> Zeroizing<String> {
        match self {
            ScramVersion::Sha1 => {
                let mut ctx = md5::Context::new();
                ctx.consume(username.as_bytes());
                ctx.consume(b":mongo:");
                ctx.consume(password.as_bytes());
                let mut digest = ctx.compute();
                let hex = Zeroizing::new(format!("{digest:x}"));
                digest.0.zeroize();
                hex
            }
            ScramVersion::Sha256 => Zeroizing::new(password.to_string()),
        }
    }
}

#[cfg(feature = "scram")]
enum ScramState {
    Initial,
    ClientFirstSent {
        client_first_bare: String,
    },
    ClientFinalSent {
        auth_message: String,
        salted_password: Zeroizing<Vec<u8>>,
    },
    Complete,
}

/// SCRAM client state for one conversation.
#[cfg(feature = "scram")]
pub struct ScramClient {
    version: ScramVersion,
    /// Base64-encoded client nonce
    client_nonce: String,
    state: ScramState,
    steps: u32,
    max_iterations: u32,
}

#[cfg(feature = "scram")]
impl std::fmt::Debug for ScramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramClient")
            .field("version", &self.version)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "scram")]
impl ScramClient {
    /// Create a new SCRAM client with a random nonce.
    pub fn new(version: ScramVersion) -> ScramClient {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        Self::with_nonce(version, &B64.encode(nonce))
    }

    /// Create a SCRAM client with a specific nonce.
    pub(crate) fn with_nonce(version: ScramVersion, nonce_b64: &str) -> ScramClient {
        ScramClient {
            version,
            client_nonce: nonce_b64.to_string(),
            state: ScramState::Initial,
            steps: 0,
            max_iterations: DEFAULT_MAX_SCRAM_ITERATIONS,
        }
    }

    /// Refuse server-first messages asking for more than `max` iterations.
    pub fn with_max_iterations(mut self, max: u32) -> ScramClient {
        self.max_iterations = max;
        self
    }

    pub fn version(&self) -> ScramVersion {
        self.version
    }

    /// Number of successful steps so far.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn step(&mut self, identity: &Identity, input: &[u8]) -> Result<Step> {
        let state = std::mem::replace(&mut self.state, ScramState::Complete);
        let step = match state {
            ScramState::Initial => {
                let (client_first, client_first_bare) = self.client_first(identity.username());
                self.state = ScramState::ClientFirstSent { client_first_bare };
                Step::pending(client_first.into_bytes())
            }
            ScramState::ClientFirstSent { client_first_bare } => {
                let server_first = utf8(input, "server-first")?;
                let (client_final, auth_message, salted_password) =
                    self.client_final(identity, &client_first_bare, server_first)?;
                self.state = ScramState::ClientFinalSent {
                    auth_message,
                    salted_password,
                };
                Step::pending(client_final.into_bytes())
            }
            ScramState::ClientFinalSent {
                auth_message,
                salted_password,
            } => {
                let server_final = utf8(input, "server-final")?;
                self.verify_server_final(server_final, &salted_password, &auth_message)?;
                Step::complete(Vec::new())
            }
            ScramState::Complete => {
                return Err(AuthError::MechanismProtocol(format!(
                    "{} conversation already complete",
                    self.version.mechanism()
                )));
            }
        };
        self.steps += 1;
        Ok(step)
    }

    /// Returns (client-first-message, client-first-message-bare).
    fn client_first(&self, username: &str) -> (String, String) {
        let user = sasl_escape_username(username);
        let client_first_bare = format!("n={user},r={}", self.client_nonce);
        (format!("n,,{client_first_bare}"), client_first_bare)
    }

    /// Parse server-first-message.
    ///
    /// Extracts:
    /// - `r`: Combined nonce (client nonce + server nonce)
    /// - `s`: Base64-encoded salt
    /// - `i`: Iteration count
    pub fn parse_server_first(server_first: &str) -> Result<(String, String, u32)> {
        let mut r = None;
        let mut s = None;
        let mut i = None;

        for part in server_first.split(',') {
            if let Some(v) = part.strip_prefix("r=") {
                r = Some(v.to_string());
            } else if let Some(v) = part.strip_prefix("s=") {
                s = Some(v.to_string());
            } else if let Some(v) = part.strip_prefix("i=") {
                i = v.parse::<u32>().ok().filter(|&n| n > 0);
            }
        }

        Ok((
            r.ok_or_else(|| {
                AuthError::MechanismProtocol("SCRAM server-first missing nonce (r=)".into())
            })?,
            s.ok_or_else(|| {
                AuthError::MechanismProtocol("SCRAM server-first missing salt (s=)".into())
            })?,
            i.ok_or_else(|| {
                AuthError::MechanismProtocol(
                    "SCRAM server-first missing or invalid iteration count (i=)".into(),
                )
            })?,
        ))
    }

    /// Compute client-final-message.
    ///
    /// Returns the message, the auth message and the salted password; the
    /// latter two are kept to verify the server in the next step.
    fn client_final(
        &self,
        identity: &Identity,
        client_first_bare: &str,
        server_first: &str,
    ) -> Result<(String, String, Zeroizing<Vec<u8>>)> {
        if let Some(err) = server_first.split(',').find_map(|p| p.strip_prefix("e=")) {
            return Err(AuthError::Verification(format!("SCRAM server error: {err}")));
        }

        let (rnonce, salt_b64, iters) = Self::parse_server_first(server_first)?;
        if iters > self.max_iterations {
            return Err(AuthError::Verification(format!(
                "SCRAM iteration count {iters} exceeds limit of {}",
                self.max_iterations
            )));
        }

        // Server nonce must extend ours
        if !rnonce.starts_with(&self.client_nonce) || rnonce.len() == self.client_nonce.len() {
            return Err(AuthError::Verification(
                "SCRAM nonce mismatch: server nonce doesn't extend client nonce".into(),
            ));
        }

        let salt = B64.decode(salt_b64.as_bytes()).map_err(|e| {
            AuthError::MechanismProtocol(format!("SCRAM invalid salt base64: {e}"))
        })?;

        // No channel binding: "biws" = base64("n,,")
        let client_final_wo_proof = format!("c=biws,r={rnonce}");
        let auth_message = format!("{client_first_bare},{server_first},{client_final_wo_proof}");

        let password = self
            .version
            .prepare_password(identity.username(), identity.password());
        let salted_password = self.version.hi(password.as_bytes(), &salt, iters)?;
        let client_key = Zeroizing::new(self.version.hmac(&salted_password, b"Client Key")?);
        let stored_key = self.version.h(&client_key);

        let client_sig = self.version.hmac(&stored_key, auth_message.as_bytes())?;
        let proof = xor_bytes(&client_key, &client_sig);

        let client_final = format!("{client_final_wo_proof},p={}", B64.encode(proof));
        Ok((client_final, auth_message, salted_password))
    }

    /// Verify server-final-message. This is where the client learns the
    /// server knows the password too.
    fn verify_server_final(
        &self,
        server_final: &str,
        salted_password: &[u8],
        auth_message: &str,
    ) -> Result<()> {
        if let Some(err) = server_final.split(',').find_map(|p| p.strip_prefix("e=")) {
            return Err(AuthError::Verification(format!("SCRAM server error: {err}")));
        }

        let v = server_final
            .split(',')
            .find_map(|p| p.strip_prefix("v="))
            .ok_or_else(|| {
                AuthError::Verification("SCRAM server-final missing signature (v=)".into())
            })?;

        let server_sig = B64.decode(v.trim().as_bytes()).map_err(|e| {
            AuthError::Verification(format!("SCRAM invalid server signature base64: {e}"))
        })?;

        let server_key = self.version.hmac(salted_password, b"Server Key")?;
        let expected = self.version.hmac(&server_key, auth_message.as_bytes())?;

        if !constant_time_eq(&server_sig, &expected) {
            return Err(AuthError::Verification(
                "SCRAM server signature mismatch: server may not know the password".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "scram")]
fn utf8<'a>(input: &'a [u8], what: &str) -> Result<&'a str> {
    std::str::from_utf8(input)
        .map_err(|e| AuthError::MechanismProtocol(format!("SCRAM {what} is not valid UTF-8: {e}")))
}

/// SASL-escape a username per RFC 5802.
///
/// Escapes `=` as `=3D` and `,` as `=2C`.
#[cfg(feature = "scram")]
fn sasl_escape_username(u: &str) -> String {
    u.replace('=', "=3D").replace(',', "=2C")
}

#[cfg(feature = "scram")]
fn mac<M: Mac + KeyInit>(key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|e| AuthError::MechanismProtocol(format!("HMAC key rejected: {e}")))?;
    mac.update(msg);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// XOR two byte slices of equal length.
#[cfg(feature = "scram")]
fn xor_bytes(a: &[u8], b: &[u8]) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len(), "XOR operands must have equal length");
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

/// Constant-time byte slice comparison.
#[cfg(feature = "scram")]
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let result = a
        .iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));

    result == 0
}
