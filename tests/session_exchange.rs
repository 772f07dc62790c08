//! End-to-end exchanges against an in-process scripted server.
//!
//! RUST_LOG=mongosql_auth=trace cargo test --test session_exchange -- --nocapture

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use bytes::Bytes;
use mongosql_auth::protocol::multiplex::{decode_client_payload, encode_server_payload};
use mongosql_auth::{
    AuthConfig, AuthError, AuthStatus, Channel, ContextProvider, Negotiation, SecurityContext,
    Session, SessionState,
};

fn init_tracing() {
    // RUST_LOG=info,mongosql_auth=debug cargo test ...
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Server half of one conversation.
trait ServerConversation {
    fn respond(&mut self, done: bool, msg: &[u8]) -> Vec<u8>;
    fn authenticated(&self) -> bool;
}

enum Phase {
    AwaitAck,
    Exchange,
}

/// Plays the server side of the plugin protocol in response to client writes.
struct ScriptedServer {
    mechanism: &'static str,
    convs: Vec<Box<dyn ServerConversation>>,
    outbound: VecDeque<Bytes>,
    phase: Phase,
    writes: usize,
    rounds: usize,
}

impl ScriptedServer {
    fn new(version: [u8; 2], mechanism: &'static str, convs: Vec<Box<dyn ServerConversation>>) -> Self {
        Self {
            mechanism,
            convs,
            outbound: VecDeque::from([Bytes::copy_from_slice(&version)]),
            phase: Phase::AwaitAck,
            writes: 0,
            rounds: 0,
        }
    }

    fn all_authenticated(&self) -> bool {
        self.convs.iter().all(|c| c.authenticated())
    }
}

impl Channel for ScriptedServer {
    fn read_packet(&mut self) -> mongosql_auth::Result<Bytes> {
        self.outbound
            .pop_front()
            .ok_or_else(|| AuthError::Transport("server hung up".into()))
    }

    fn write_packet(&mut self, payload: &[u8]) -> mongosql_auth::Result<()> {
        self.writes += 1;
        match self.phase {
            Phase::AwaitAck => {
                if payload != [0] {
                    return Err(AuthError::Framing("expected handshake ack".into()));
                }
                let mut offer = self.mechanism.as_bytes().to_vec();
                offer.push(0);
                offer.extend_from_slice(&(self.convs.len() as u32).to_le_bytes());
                self.outbound.push_back(Bytes::from(offer));
                self.phase = Phase::Exchange;
            }
            Phase::Exchange => {
                self.rounds += 1;
                let segs = decode_client_payload(Bytes::copy_from_slice(payload), self.convs.len())?;
                let all_done = segs.iter().all(|(done, _)| *done);
                let replies: Vec<Vec<u8>> = self
                    .convs
                    .iter_mut()
                    .zip(&segs)
                    .map(|(conv, (done, msg))| conv.respond(*done, msg))
                    .collect();
                if !all_done {
                    self.outbound
                        .push_back(encode_server_payload(replies.iter().map(Vec::as_slice))?);
                }
            }
        }
        Ok(())
    }
}

struct PlainServer {
    expected: Vec<u8>,
    ok: bool,
}

impl PlainServer {
    fn boxed(user: &str, pass: &str) -> Box<dyn ServerConversation> {
        Box::new(Self {
            expected: format!("\0{user}\0{pass}").into_bytes(),
            ok: false,
        })
    }
}

impl ServerConversation for PlainServer {
    fn respond(&mut self, done: bool, msg: &[u8]) -> Vec<u8> {
        self.ok = done && msg == self.expected.as_slice();
        Vec::new()
    }

    fn authenticated(&self) -> bool {
        self.ok
    }
}

mod scram_server {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as B64;
    use hmac::{Hmac, Mac};
    use sha1::Sha1;
    use sha2::{Digest, Sha256};

    use super::ServerConversation;

    #[derive(Clone, Copy)]
    pub enum Hash {
        Sha1,
        Sha256,
    }

    fn hmac(hash: Hash, key: &[u8], msg: &[u8]) -> Vec<u8> {
        match hash {
            Hash::Sha1 => {
                let mut m = Hmac::<Sha1>::new_from_slice(key).unwrap();
                m.update(msg);
                m.finalize().into_bytes().to_vec()
            }
            Hash::Sha256 => {
                let mut m = Hmac::<Sha256>::new_from_slice(key).unwrap();
                m.update(msg);
                m.finalize().into_bytes().to_vec()
            }
        }
    }

    fn h(hash: Hash, msg: &[u8]) -> Vec<u8> {
        match hash {
            Hash::Sha1 => Sha1::digest(msg).to_vec(),
            Hash::Sha256 => Sha256::digest(msg).to_vec(),
        }
    }

    fn salted_password(hash: Hash, password: &[u8], salt: &[u8], iters: u32) -> Vec<u8> {
        let mut block = salt.to_vec();
        block.extend_from_slice(&1u32.to_be_bytes());
        let mut u = hmac(hash, password, &block);
        let mut out = u.clone();
        for _ in 1..iters {
            u = hmac(hash, password, &u);
            out.iter_mut().zip(&u).for_each(|(o, x)| *o ^= x);
        }
        out
    }

    enum State {
        AwaitFirst,
        AwaitFinal {
            client_first_bare: String,
            server_first: String,
        },
        AwaitDone,
        Authenticated,
        Rejected,
    }

    pub struct ScramServer {
        hash: Hash,
        user: String,
        password: String,
        salt: Vec<u8>,
        iters: u32,
        server_nonce: String,
        state: State,
    }

    impl ScramServer {
        pub fn boxed(hash: Hash, user: &str, password: &str) -> Box<dyn ServerConversation> {
            Box::new(Self {
                hash,
                user: user.to_string(),
                password: password.to_string(),
                salt: b"mongosql-salt".to_vec(),
                iters: 64,
                server_nonce: "c2VydmVyLW5vbmNl".to_string(),
                state: State::AwaitFirst,
            })
        }

        fn hi_password(&self) -> String {
            match self.hash {
                Hash::Sha1 => {
                    format!("{:x}", md5::compute(format!("{}:mongo:{}", self.user, self.password)))
                }
                Hash::Sha256 => self.password.clone(),
            }
        }
    }

    impl ServerConversation for ScramServer {
        fn respond(&mut self, _done: bool, msg: &[u8]) -> Vec<u8> {
            let msg = std::str::from_utf8(msg).unwrap();
            match std::mem::replace(&mut self.state, State::Rejected) {
                State::AwaitFirst => {
                    let bare = msg.strip_prefix("n,,").unwrap().to_string();
                    let (user, nonce) = bare.strip_prefix("n=").unwrap().split_once(",r=").unwrap();
                    assert_eq!(user, self.user);
                    let server_first = format!(
                        "r={nonce}{},s={},i={}",
                        self.server_nonce,
                        B64.encode(&self.salt),
                        self.iters
                    );
                    self.state = State::AwaitFinal {
                        client_first_bare: bare.clone(),
                        server_first: server_first.clone(),
                    };
                    server_first.into_bytes()
                }
                State::AwaitFinal {
                    client_first_bare,
                    server_first,
                } => {
                    let (without_proof, proof) = msg.rsplit_once(",p=").unwrap();
                    let proof = B64.decode(proof).unwrap();
                    let auth_message = format!("{client_first_bare},{server_first},{without_proof}");

                    let salted = salted_password(
                        self.hash,
                        self.hi_password().as_bytes(),
                        &self.salt,
                        self.iters,
                    );
                    let stored_key = h(self.hash, &hmac(self.hash, &salted, b"Client Key"));
                    let signature = hmac(self.hash, &stored_key, auth_message.as_bytes());
                    let client_key: Vec<u8> =
                        proof.iter().zip(&signature).map(|(p, s)| p ^ s).collect();
                    if h(self.hash, &client_key) != stored_key {
                        return b"e=invalid-proof".to_vec();
                    }

                    let server_key = hmac(self.hash, &salted, b"Server Key");
                    let verifier = hmac(self.hash, &server_key, auth_message.as_bytes());
                    self.state = State::AwaitDone;
                    format!("v={}", B64.encode(verifier)).into_bytes()
                }
                State::AwaitDone => {
                    self.state = State::Authenticated;
                    Vec::new()
                }
                State::Authenticated | State::Rejected => Vec::new(),
            }
        }

        fn authenticated(&self) -> bool {
            matches!(self.state, State::Authenticated)
        }
    }
}

/// Kerberos stand-in: one AP-REQ/AP-REP round, then the wrapped QOP reply.
#[derive(Debug, Default)]
struct FakeKerberos {
    targets: Mutex<Vec<String>>,
}

struct FakeContext {
    sent_request: bool,
}

impl SecurityContext for FakeContext {
    fn negotiate(&mut self, input: &[u8]) -> mongosql_auth::Result<Negotiation> {
        if !self.sent_request {
            self.sent_request = true;
            return Ok(Negotiation::Continue(b"AP-REQ".to_vec()));
        }
        if input != b"AP-REP" {
            return Err(AuthError::Verification("bad AP-REP".into()));
        }
        Ok(Negotiation::Complete(Vec::new()))
    }

    fn username(&mut self) -> mongosql_auth::Result<String> {
        Ok("alice@EXAMPLE.COM".into())
    }

    fn wrap(&mut self, message: &[u8]) -> mongosql_auth::Result<Vec<u8>> {
        let mut out = b"WRAP".to_vec();
        out.extend_from_slice(message);
        Ok(out)
    }
}

impl ContextProvider for FakeKerberos {
    fn init(
        &self,
        _username: &str,
        _password: Option<&str>,
        target_spn: &str,
    ) -> mongosql_auth::Result<Box<dyn SecurityContext>> {
        self.targets.lock().unwrap().push(target_spn.to_string());
        Ok(Box::new(FakeContext {
            sent_request: false,
        }))
    }
}

#[derive(Default)]
struct KerberosServer {
    round: usize,
    ok: bool,
}

impl ServerConversation for KerberosServer {
    fn respond(&mut self, done: bool, msg: &[u8]) -> Vec<u8> {
        self.round += 1;
        match self.round {
            1 => {
                assert_eq!(msg, b"AP-REQ");
                b"AP-REP".to_vec()
            }
            2 => b"QOP".to_vec(),
            _ => {
                self.ok = done && msg == b"WRAP\x01\x00\x00\x00alice@EXAMPLE.COM";
                Vec::new()
            }
        }
    }

    fn authenticated(&self) -> bool {
        self.ok
    }
}

#[test]
fn plain_authenticates_every_conversation() -> Result<()> {
    init_tracing();
    let convs = (0..4).map(|_| PlainServer::boxed("alice", "secret")).collect();
    let mut server = ScriptedServer::new([1, 0], "plain", convs);

    let mut session = Session::new(&mut server, AuthConfig::default());
    session.authenticate("alice?source=admin", "secret", "db.example.com")?;
    assert_eq!(session.status(), AuthStatus::Ok);
    assert_eq!(session.state(), SessionState::Done);
    drop(session);

    assert!(server.all_authenticated());
    assert_eq!(server.rounds, 1);
    assert!(server.outbound.is_empty());
    Ok(())
}

#[cfg(feature = "scram")]
#[test]
fn scram_sha256_three_conversations() -> Result<()> {
    use scram_server::{Hash, ScramServer};

    init_tracing();
    let convs = (0..3)
        .map(|_| ScramServer::boxed(Hash::Sha256, "alice", "secret"))
        .collect();
    let mut server = ScriptedServer::new([1, 0], "SCRAM-SHA-256", convs);

    let mut session = Session::new(&mut server, AuthConfig::default());
    session.authenticate("alice?source=admin", "secret", "db.example.com")?;
    assert_eq!(session.rounds(), 3);
    assert_eq!(session.mechanism(), Some("SCRAM-SHA-256"));
    drop(session);

    assert!(server.all_authenticated());
    assert_eq!(server.writes, 4);
    Ok(())
}

#[cfg(feature = "scram")]
#[test]
fn scram_sha1_uses_mongodb_password_digest() -> Result<()> {
    use scram_server::{Hash, ScramServer};

    init_tracing();
    let convs = (0..2)
        .map(|_| ScramServer::boxed(Hash::Sha1, "bob", "hunter2"))
        .collect();
    let mut server = ScriptedServer::new([1, 0], "scram-sha-1", convs);

    Session::new(&mut server, AuthConfig::default()).authenticate("bob", "hunter2", "h")?;
    assert!(server.all_authenticated());
    Ok(())
}

#[cfg(feature = "scram")]
#[test]
fn scram_wrong_password_stops_after_server_rejects() {
    use scram_server::{Hash, ScramServer};

    init_tracing();
    let convs = (0..2)
        .map(|_| ScramServer::boxed(Hash::Sha256, "alice", "secret"))
        .collect();
    let mut server = ScriptedServer::new([1, 0], "SCRAM-SHA-256", convs);

    let mut session = Session::new(&mut server, AuthConfig::default());
    let err = session
        .authenticate("alice", "not-the-password", "h")
        .unwrap_err();
    assert!(matches!(err, AuthError::Verification(_)));
    assert!(session.error_message().unwrap().contains("invalid-proof"));
    assert_eq!(session.status(), AuthStatus::Error);
    drop(session);

    assert!(!server.all_authenticated());
    // first and final client messages, nothing after the rejection
    assert_eq!(server.rounds, 2);
}

#[test]
fn gssapi_runs_through_injected_provider() -> Result<()> {
    init_tracing();
    let kerberos = Arc::new(FakeKerberos::default());
    let config = AuthConfig::default().with_context_provider(kerberos.clone());
    let convs = (0..2)
        .map(|_| Box::new(KerberosServer::default()) as Box<dyn ServerConversation>)
        .collect();
    let mut server = ScriptedServer::new([1, 0], "GSSAPI", convs);

    let mut session = Session::new(&mut server, config);
    session.authenticate("alice?serviceName=mongosqld", "", "db.example.com")?;
    assert_eq!(session.rounds(), 3);
    drop(session);

    assert!(server.all_authenticated());
    assert_eq!(
        *kerberos.targets.lock().unwrap(),
        vec!["mongosqld@db.example.com", "mongosqld@db.example.com"]
    );
    Ok(())
}

#[test]
fn gssapi_without_provider_fails_before_exchange() {
    init_tracing();
    let convs = vec![Box::new(KerberosServer::default()) as Box<dyn ServerConversation>];
    let mut server = ScriptedServer::new([1, 0], "GSSAPI", convs);

    let err = Session::new(&mut server, AuthConfig::default())
        .authenticate("alice", "", "h")
        .unwrap_err();
    assert!(matches!(err, AuthError::UnsupportedMechanism(_)));
    assert_eq!(server.rounds, 0);
}

#[test]
fn version_mismatch_sends_nothing() {
    init_tracing();
    let convs = vec![PlainServer::boxed("alice", "secret")];
    let mut server = ScriptedServer::new([1, 1], "PLAIN", convs);

    let err = Session::new(&mut server, AuthConfig::default())
        .authenticate("alice", "secret", "h")
        .unwrap_err();
    assert!(err.is_version_mismatch());
    assert_eq!(
        err.to_string(),
        "server protocol version 1.1 incompatible with client protocol version 1.0"
    );
    assert_eq!(server.writes, 0);
}
