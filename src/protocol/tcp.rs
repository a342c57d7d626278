//! TCP protocol - RFC 793
//!
//! Only what the firewall needs: ports and control flags.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// TCP control flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
}

impl TcpFlags {
    pub const SYN: TcpFlags = TcpFlags {
        fin: false,
        syn: true,
        rst: false,
        psh: false,
        ack: false,
        urg: false,
    };

    /// Parse flags from the 13th byte of the TCP header
    pub fn from_byte(byte: u8) -> Self {
        Self {
            fin: (byte & 0x01) != 0,
            syn: (byte & 0x02) != 0,
            rst: (byte & 0x04) != 0,
            psh: (byte & 0x08) != 0,
            ack: (byte & 0x10) != 0,
            urg: (byte & 0x20) != 0,
        }
    }

    pub fn to_byte(&self) -> u8 {
        [self.fin, self.syn, self.rst, self.psh, self.ack, self.urg]
            .iter()
            .enumerate()
            .fold(0u8, |acc, (bit, set)| acc | ((*set as u8) << bit))
    }

    /// Connection opening (SYN without ACK)
    pub fn is_syn_only(&self) -> bool {
        self.syn && !self.ack
    }

    /// Connection teardown (FIN or RST)
    pub fn is_fin_or_rst(&self) -> bool {
        self.fin || self.rst
    }
}

/// Parsed TCP header (zero-copy reference)
#[derive(Debug)]
pub struct TcpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> TcpHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP header too short".into()));
        }

        let header_len = (buffer[12] >> 4) as usize * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP data offset too small".into()));
        }
        if buffer.len() < header_len {
            return Err(Error::Parse("TCP header truncated".into()));
        }

        Ok(Self { buffer })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_byte(self.buffer[13])
    }
}

/// Bare 20-byte TCP header (no options, zero checksum) for parser tests
#[cfg(test)]
pub(crate) fn build_segment(src_port: u16, dst_port: u16, flags: TcpFlags) -> Vec<u8> {
    let mut buf = vec![0u8; MIN_HEADER_SIZE];
    buf[0..2].copy_from_slice(&src_port.to_be_bytes());
    buf[2..4].copy_from_slice(&dst_port.to_be_bytes());
    buf[12] = 5 << 4;
    buf[13] = flags.to_byte();
    buf[14..16].copy_from_slice(&64240u16.to_be_bytes());
    buf
}
