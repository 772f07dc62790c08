//! Ready-made drivers that run a whole authentication over a byte stream.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   username/password  ┌─────────────────┐
//! │                 │─────────────────────►│                 │
//! │  Your App       │                      │  Session        │
//! │                 │◄─────────────────────│  (N convs)      │
//! │                 │   Ok / AuthError     │                 │
//! └─────────────────┘                      └────────┬────────┘
//!                                                   │
//!                                                   │ PacketStream
//!                                                   ▼
//!                                          ┌─────────────────┐
//!                                          │   mongosqld     │
//!                                          │  (auth plugin)  │
//!                                          └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::net::TcpStream;
//!
//! use mongosql_auth::AuthConfig;
//! use mongosql_auth::client;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // The MySQL handshake has already switched to the mongosql_auth plugin
//!     // and the next packet expected from the server has sequence id 2.
//!     let tcp = TcpStream::connect("db.example.com:3307")?;
//!     let packets = client::authenticate_with_sequence(
//!         tcp,
//!         2,
//!         &AuthConfig::default(),
//!         "alice?source=admin",
//!         "secret",
//!         "db.example.com",
//!     )?;
//!     println!("authenticated, next sequence id {}", packets.sequence());
//!     Ok(())
//! }
//! ```

mod blocking;
#[cfg(feature = "tokio")]
mod tokio_client;

pub use blocking::{authenticate, authenticate_with_sequence};
#[cfg(feature = "tokio")]
pub use tokio_client::authenticate_async;
