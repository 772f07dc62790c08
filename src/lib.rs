//! Client side of the `mongosql_auth` authentication plugin.
//!
//! The server picks one mechanism and a number of parallel conversations; the
//! client runs that many independent instances of the mechanism and ships
//! their messages to the server multiplexed into one packet per round.
//!
//! Start with [`client::authenticate`] for a blocking stream, or drive a
//! [`Session`] over your own [`Channel`].

#![warn(
    clippy::all,
    clippy::cargo,
    clippy::perf,
    clippy::style,
    clippy::correctness,
    clippy::suspicious
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod auth;
pub mod channel;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod session;

pub use auth::{ContextProvider, MechanismKind, Negotiation, SecurityContext};
pub use channel::Channel;
pub use config::{AuthConfig, ProtocolVersion};
pub use conversation::Conversation;
pub use error::{AuthError, Result};
pub use identity::Identity;
pub use protocol::PacketStream;
pub use session::{AuthStatus, Session, SessionState};
