//! IPv6 protocol - RFC 8200
//!
//! Fixed header only. Extension headers are not walked, so a packet whose
//! next header is not TCP or UDP carries no ports.

use crate::{Error, Result};
use std::net::Ipv6Addr;

/// IPv6 header size (fixed, unlike IPv4)
pub const HEADER_SIZE: usize = 40;

/// Parsed IPv6 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv6Header<'a> {
    buffer: &'a [u8],
}

impl<'a> Ipv6Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("IPv6 header too short".into()));
        }

        if buffer[0] >> 4 != 6 {
            return Err(Error::Parse("not an IPv6 packet".into()));
        }

        Ok(Self { buffer })
    }

    /// Next Header, same numbering as the IPv4 protocol field
    pub fn next_header(&self) -> u8 {
        self.buffer[6]
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&self.buffer[8..24]);
        Ipv6Addr::from(octets)
    }

    pub fn dst_addr(&self) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&self.buffer[24..40]);
        Ipv6Addr::from(octets)
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }
}

/// Minimal IPv6 packets for parser tests
#[cfg(test)]
pub(crate) fn build_packet(src: Ipv6Addr, dst: Ipv6Addr, next_header: u8, payload: &[u8]) -> Vec<u8> {
    let len = u16::try_from(payload.len()).expect("IPv6 payload exceeds 65535 bytes");
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&[0x60, 0, 0, 0]);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.push(next_header);
    buf.push(64);
    buf.extend_from_slice(&src.octets());
    buf.extend_from_slice(&dst.octets());
    buf.extend_from_slice(payload);
    buf
}
