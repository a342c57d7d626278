//! UDP protocol - RFC 768

use crate::{Error, Result};

/// UDP header size (fixed)
pub const HEADER_SIZE: usize = 8;

/// Parsed UDP header (zero-copy reference)
#[derive(Debug)]
pub struct UdpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> UdpHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("UDP header too short".into()));
        }

        Ok(Self { buffer })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }
}

/// UDP datagram with a zero (unused) checksum, for parser tests
#[cfg(test)]
pub(crate) fn build_datagram(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let len =
        u16::try_from(HEADER_SIZE + payload.len()).expect("UDP payload exceeds 65527 bytes");
    let mut buf = Vec::with_capacity(usize::from(len));
    buf.extend_from_slice(&src_port.to_be_bytes());
    buf.extend_from_slice(&dst_port.to_be_bytes());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&[0, 0]);
    buf.extend_from_slice(payload);
    buf
}
