//! Address classification into named zones
//!
//! Zones are checked in configuration order and the first range containing
//! the address wins, so overlapping ranges resolve deterministically (list
//! the more specific range first if it should take precedence).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// IPv4 or IPv6 CIDR range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    network: IpAddr,
    prefix_len: u8,
}

impl Cidr {
    /// Create a CIDR, masking host bits off `addr`
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max {
            return Err(Error::Parse(format!(
                "prefix length {} out of range for {}",
                prefix_len, addr
            )));
        }

        let network = match addr {
            IpAddr::V4(a) => IpAddr::V4((u32::from(a) & v4_mask(prefix_len)).into()),
            IpAddr::V6(a) => IpAddr::V6((u128::from(a) & v6_mask(prefix_len)).into()),
        };
        Ok(Self {
            network,
            prefix_len,
        })
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Check if an address is within this range (families never cross-match)
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(a)) => {
                let mask = v4_mask(self.prefix_len);
                u32::from(net) & mask == u32::from(a) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(a)) => {
                let mask = v6_mask(self.prefix_len);
                u128::from(net) & mask == u128::from(a) & mask
            }
            _ => false,
        }
    }
}

fn v4_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        !0u32 << (32 - prefix_len)
    }
}

fn v6_mask(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        !0u128 << (128 - prefix_len)
    }
}

impl FromStr for Cidr {
    type Err = Error;

    /// Parse "192.168.1.0/24" or "2001:db8::/32"
    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::Parse(format!("missing prefix length in {:?}", s)))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| Error::Parse(format!("invalid address in {:?}", s)))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| Error::Parse(format!("invalid prefix length in {:?}", s)))?;
        Self::new(addr, prefix_len)
    }
}

impl TryFrom<String> for Cidr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// A named address range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub name: String,
    pub cidr: Cidr,
}

impl Zone {
    pub fn new(name: impl Into<String>, cidr: Cidr) -> Self {
        Self {
            name: name.into(),
            cidr,
        }
    }
}

/// Ordered zone list
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    zones: Vec<Zone>,
}

impl Classifier {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    /// Name of the first zone containing `addr`, `None` if unclassified
    pub fn classify(&self, addr: IpAddr) -> Option<&str> {
        self.zones
            .iter()
            .find(|zone| zone.cidr.contains(addr))
            .map(|zone| zone.name.as_str())
    }

    /// Classify textual input; malformed addresses are reported, not fatal
    pub fn classify_str(&self, addr: &str) -> Result<Option<&str>> {
        let parsed: IpAddr = addr.trim().parse().map_err(|_| Error::Classification {
            addr: addr.to_string(),
        })?;
        Ok(self.classify(parsed))
    }

    /// Whether `addr` classifies as `zone`
    pub fn is_in(&self, zone: &str, addr: IpAddr) -> bool {
        self.classify(addr) == Some(zone)
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }
}
