//! IPv4 protocol - RFC 791
//!
//! Header parsing only; rewriting is done by the switch via flow actions.

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// IP protocol numbers
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// Parsed IPv4 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 header too short".into()));
        }

        if buffer[0] >> 4 != 4 {
            return Err(Error::Parse("not an IPv4 packet".into()));
        }

        let header_len = (buffer[0] & 0x0F) as usize * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 IHL too small".into()));
        }
        if buffer.len() < header_len {
            return Err(Error::Parse("IPv4 header truncated".into()));
        }

        Ok(Self { buffer, header_len })
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }

    /// Non-first fragments carry no L4 header
    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6] & 0x1F, self.buffer[7]])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.header_len..]
    }
}

/// Minimal IPv4 packets for parser tests (no options, checksum left zero)
#[cfg(test)]
pub(crate) struct Ipv4Builder {
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: u8,
    payload: Vec<u8>,
}

#[cfg(test)]
impl Ipv4Builder {
    pub(crate) fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8) -> Self {
        Self {
            src,
            dst,
            protocol,
            payload: Vec::new(),
        }
    }

    pub(crate) fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let total_len = u16::try_from(MIN_HEADER_SIZE + self.payload.len())
            .expect("IPv4 payload exceeds 65515 bytes");
        let mut buf = Vec::with_capacity(usize::from(total_len));
        buf.push(0x45);
        buf.push(0);
        buf.extend_from_slice(&total_len.to_be_bytes());
        buf.extend_from_slice(&[0, 0, 0x40, 0]);
        buf.push(64);
        buf.push(self.protocol);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&self.src.octets());
        buf.extend_from_slice(&self.dst.octets());
        buf.extend_from_slice(&self.payload);
        buf
    }
}
