use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use zeroize::Zeroizing;

use crate::channel::Channel;
use crate::config::DEFAULT_MAX_SERVER_PAYLOAD;
use crate::error::{AuthError, Result};

/// Largest payload a single MySQL packet can carry. A payload of exactly this
/// size is followed by another packet (possibly empty) holding the rest.
pub const MAX_PACKET_PAYLOAD: usize = 0x00FF_FFFF;

/// MySQL client/server packet framing: `[len:u24 LE][seq:u8][payload]`.
///
/// This is the framing the auth plugin's messages travel in once the MySQL
/// handshake has handed control to the plugin.
#[derive(Debug)]
pub struct PacketStream<S> {
    stream: S,
    seq: u8,
    max_packet: usize,
}

impl<S> PacketStream<S> {
    pub fn new(stream: S) -> Self {
        Self::with_sequence(stream, 0)
    }

    /// Start from a sequence id other than 0, e.g. when taking over a
    /// connection in the middle of the MySQL handshake.
    pub fn with_sequence(stream: S, seq: u8) -> Self {
        Self {
            stream,
            seq,
            max_packet: DEFAULT_MAX_SERVER_PAYLOAD,
        }
    }

    /// Cap on a reassembled inbound payload. Larger messages fail with a
    /// framing error before their bytes are buffered.
    pub fn with_max_packet(mut self, max: usize) -> Self {
        self.max_packet = max;
        self
    }

    pub fn max_packet(&self) -> usize {
        self.max_packet
    }

    /// Sequence id the next written packet will carry.
    pub fn sequence(&self) -> u8 {
        self.seq
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read> PacketStream<S> {
    fn read_one(&mut self, out: &mut BytesMut) -> Result<usize> {
        let mut hdr = [0u8; 4];
        self.stream.read_exact(&mut hdr)?;
        let len = u32::from_le_bytes([hdr[0], hdr[1], hdr[2], 0]) as usize;
        let seq = hdr[3];
        if seq != self.seq {
            tracing::trace!(expected = self.seq, got = seq, "adopting server sequence id");
        }
        self.seq = seq.wrapping_add(1);

        let start = out.len();
        if start + len > self.max_packet {
            return Err(AuthError::Framing(format!(
                "server packet of at least {} bytes exceeds limit of {}",
                start + len,
                self.max_packet
            )));
        }
        out.resize(start + len, 0);
        self.stream.read_exact(&mut out[start..])?;
        Ok(len)
    }
}

impl<S: Write> PacketStream<S> {
    fn write_one(&mut self, buf: &mut Vec<u8>, chunk: &[u8]) {
        let len = chunk.len() as u32;
        buf.put_slice(&len.to_le_bytes()[..3]);
        buf.put_u8(self.seq);
        buf.put_slice(chunk);
        self.seq = self.seq.wrapping_add(1);
    }
}

impl<S: Read + Write> Channel for PacketStream<S> {
    fn read_packet(&mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        while self.read_one(&mut out)? == MAX_PACKET_PAYLOAD {}
        Ok(out.freeze())
    }

    fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        // the frame holds a copy of the payload, which may carry credentials
        let mut buf = Zeroizing::new(Vec::with_capacity(payload.len() + 8));
        let mut last_len = 0;
        for chunk in payload.chunks(MAX_PACKET_PAYLOAD) {
            self.write_one(&mut buf, chunk);
            last_len = chunk.len();
        }
        // An empty payload, or one ending on a full packet, still needs a
        // short terminating packet.
        if payload.is_empty() || last_len == MAX_PACKET_PAYLOAD {
            self.write_one(&mut buf, &[]);
        }

        self.stream.write_all(&buf)?;
        self.stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// In-memory stream: reads come from `input`, writes go to `output`.
    #[derive(Debug)]
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn duplex(input: Vec<u8>) -> Duplex {
        Duplex {
            input: Cursor::new(input),
            output: Vec::new(),
        }
    }

    #[test]
    fn writes_header_and_advances_sequence() {
        let mut ps = PacketStream::with_sequence(duplex(vec![]), 3);
        ps.write_packet(&[0]).unwrap();
        ps.write_packet(b"ab").unwrap();
        assert_eq!(ps.get_ref().output, vec![1, 0, 0, 3, 0, 2, 0, 0, 4, b'a', b'b']);
        assert_eq!(ps.sequence(), 5);
    }

    #[test]
    fn reads_payload_and_adopts_sequence() {
        let mut ps = PacketStream::new(duplex(vec![2, 0, 0, 7, 1, 0]));
        let pkt = ps.read_packet().unwrap();
        assert_eq!(&pkt[..], &[1, 0]);
        assert_eq!(ps.sequence(), 8);
    }

    #[test]
    fn empty_payload_is_one_empty_packet() {
        let mut ps = PacketStream::new(duplex(vec![]));
        ps.write_packet(&[]).unwrap();
        assert_eq!(ps.get_ref().output, vec![0, 0, 0, 0]);
    }

    #[test]
    fn reassembles_split_payloads() {
        let mut input = Vec::new();
        input.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0]);
        input.extend(std::iter::repeat_n(0xAB, MAX_PACKET_PAYLOAD));
        input.extend_from_slice(&[1, 0, 0, 1, 0xCD]);

        let mut ps = PacketStream::new(duplex(input));
        let pkt = ps.read_packet().unwrap();
        assert_eq!(pkt.len(), MAX_PACKET_PAYLOAD + 1);
        assert_eq!(pkt[MAX_PACKET_PAYLOAD], 0xCD);
        assert_eq!(ps.sequence(), 2);
    }

    #[test]
    fn truncated_stream_is_transport_error() {
        let mut ps = PacketStream::new(duplex(vec![5, 0, 0, 0, 1]));
        let err = ps.read_packet().unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn reassembly_stops_at_max_packet() {
        // headers only: the limit must trip before any payload is read
        let mut input = Vec::new();
        for seq in 0..4 {
            input.extend_from_slice(&[0xFF, 0xFF, 0xFF, seq]);
        }
        let mut ps = PacketStream::new(duplex(input));
        assert_eq!(ps.max_packet(), DEFAULT_MAX_SERVER_PAYLOAD);
        let err = ps.read_packet().unwrap_err();
        assert!(err.is_framing());
        assert!(err.to_string().contains("exceeds limit"));
    }

    #[test]
    fn max_packet_counts_split_continuations() {
        let mut input = vec![0xFF, 0xFF, 0xFF, 0];
        input.extend(std::iter::repeat_n(0u8, MAX_PACKET_PAYLOAD));
        input.extend_from_slice(&[20, 0, 0, 1]);

        let mut ps = PacketStream::new(duplex(input)).with_max_packet(MAX_PACKET_PAYLOAD + 10);
        let err = ps.read_packet().unwrap_err();
        assert!(err.is_framing());
    }

    #[test]
    fn message_at_the_limit_is_accepted() {
        let mut ps = PacketStream::new(duplex(vec![3, 0, 0, 0, 1, 2, 3])).with_max_packet(3);
        assert_eq!(&ps.read_packet().unwrap()[..], &[1, 2, 3]);

        let mut ps = PacketStream::new(duplex(vec![4, 0, 0, 0])).with_max_packet(3);
        assert!(ps.read_packet().unwrap_err().is_framing());
    }
}
