//! mongosql auth plugin wire protocol.
//!
//! This module provides the pure encode/decode primitives:
//! - Packet framing over a byte stream ([`framing`])
//! - Version handshake and mechanism announcement ([`messages`])
//! - Multiplexed conversation payloads ([`multiplex`])
//!
//! # Exchange Overview
//!
//! ```text
//! server: [major:u8][minor:u8]
//! client: [0x00]
//! server: [mechanism\0][num_conversations:u32 LE]
//! client: N x [done:u8][len:u32 LE][bytes]     ┐
//! server: N x [len:u32 LE][bytes]               ┘ repeated until every
//!                                                 conversation is done
//! ```
//!
//! All integers are little-endian.

pub mod framing;
pub mod messages;
pub mod multiplex;

pub use framing::PacketStream;
pub use messages::{
    HANDSHAKE_ACK, MechanismOffer, check_version, parse_handshake, parse_mechanism_offer,
};
pub use multiplex::{
    Segment, decode_client_payload, decode_server_payload, encode_client_payload,
    encode_server_payload,
};
