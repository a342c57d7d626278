//! Link-layer types shared by the parser and the decision engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    pub const ZERO: MacAddr = MacAddr([0, 0, 0, 0, 0, 0]);

    /// 802.1D reserved block `01:80:c2:00:00:00/44` (STP, LACP, LLDP, ...)
    const BRIDGE_FILTERED_PREFIX: [u8; 5] = [0x01, 0x80, 0xc2, 0x00, 0x00];

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    /// Destinations a compliant bridge must never forward.
    pub fn is_bridge_filtered(&self) -> bool {
        self.0[..5] == Self::BRIDGE_FILTERED_PREFIX && self.0[5] <= 0x0f
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error type for MAC address parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacAddrError {
    input: String,
}

impl fmt::Display for ParseMacAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address {:?}", self.input)
    }
}

impl std::error::Error for ParseMacAddrError {}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Accepts `00:11:22:33:44:55` or `00-11-22-33-44-55`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMacAddrError {
            input: s.to_string(),
        };

        let octets: Vec<&str> = s.split([':', '-']).collect();
        if octets.len() != 6 {
            return Err(err());
        }

        let mut result = [0u8; 6];
        for (slot, octet) in result.iter_mut().zip(octets) {
            if octet.len() != 2 {
                return Err(err());
            }
            *slot = u8::from_str_radix(octet, 16).map_err(|_| err())?;
        }

        Ok(MacAddr(result))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = ParseMacAddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

/// EtherType values the controller cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
    Vlan = 0x8100,
    Ipv6 = 0x86DD,
    Lldp = 0x88CC,
}

impl EtherType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0800 => Some(EtherType::Ipv4),
            0x0806 => Some(EtherType::Arp),
            0x8100 => Some(EtherType::Vlan),
            0x86DD => Some(EtherType::Ipv6),
            0x88CC => Some(EtherType::Lldp),
            _ => None,
        }
    }
}

/// VLAN tag (802.1Q), only the VID is carried into flow matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    pub pcp: u8,
    pub vid: u16,
}

impl VlanTag {
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let value = u16::from_be_bytes(bytes);
        Self {
            pcp: ((value >> 13) & 0x07) as u8,
            vid: value & 0x0FFF,
        }
    }
}
