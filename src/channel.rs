use bytes::Bytes;

use crate::error::Result;

/// A message-oriented duplex channel to the server.
///
/// Message boundaries are preserved: one `write_packet` on the client is one
/// `read_packet` on the server and vice versa. Implementations block until a
/// whole message has been read or written; timeouts, if any, are theirs to
/// impose.
pub trait Channel {
    fn read_packet(&mut self) -> Result<Bytes>;

    fn write_packet(&mut self, payload: &[u8]) -> Result<()>;
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn read_packet(&mut self) -> Result<Bytes> {
        (**self).read_packet()
    }

    fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        (**self).write_packet(payload)
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn read_packet(&mut self) -> Result<Bytes> {
        (**self).read_packet()
    }

    fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        (**self).write_packet(payload)
    }
}
