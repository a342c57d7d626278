//! Packet-in events and the header fields the decision engine works on
//!
//! Mirrors the OpenFlow 1.0 twelve-tuple: whatever the controller can match
//! on is extracted once here, either from the raw frame or handed in
//! already parsed by the transport.

use crate::protocol::ethernet::Frame;
use crate::protocol::ipv4::{protocol, Ipv4Header};
use crate::protocol::ipv6::Ipv6Header;
use crate::protocol::tcp::{TcpFlags, TcpHeader};
use crate::protocol::udp::UdpHeader;
use crate::protocol::{EtherType, MacAddr};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Switch port number
pub type PortNo = u16;

/// Header fields of a punted packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketFields {
    pub dl_src: MacAddr,
    pub dl_dst: MacAddr,
    pub dl_type: u16,
    #[serde(default)]
    pub dl_vlan: Option<u16>,
    #[serde(default)]
    pub nw_src: Option<IpAddr>,
    #[serde(default)]
    pub nw_dst: Option<IpAddr>,
    #[serde(default)]
    pub nw_proto: Option<u8>,
    #[serde(default)]
    pub tp_src: Option<u16>,
    #[serde(default)]
    pub tp_dst: Option<u16>,
    #[serde(default)]
    pub tcp_flags: Option<TcpFlags>,
}

impl PacketFields {
    /// Bare L2 fields
    pub fn ethernet(dl_src: MacAddr, dl_dst: MacAddr, dl_type: u16) -> Self {
        Self {
            dl_src,
            dl_dst,
            dl_type,
            dl_vlan: None,
            nw_src: None,
            nw_dst: None,
            nw_proto: None,
            tp_src: None,
            tp_dst: None,
            tcp_flags: None,
        }
    }

    /// L2 + IP fields
    pub fn ip(
        dl_src: MacAddr,
        dl_dst: MacAddr,
        nw_src: IpAddr,
        nw_dst: IpAddr,
        nw_proto: u8,
    ) -> Self {
        let dl_type = match nw_src {
            IpAddr::V4(_) => EtherType::Ipv4 as u16,
            IpAddr::V6(_) => EtherType::Ipv6 as u16,
        };
        Self {
            nw_src: Some(nw_src),
            nw_dst: Some(nw_dst),
            nw_proto: Some(nw_proto),
            ..Self::ethernet(dl_src, dl_dst, dl_type)
        }
    }

    /// L2 + IP + TCP fields
    pub fn tcp(
        dl_src: MacAddr,
        dl_dst: MacAddr,
        src: (IpAddr, u16),
        dst: (IpAddr, u16),
        flags: TcpFlags,
    ) -> Self {
        Self {
            tp_src: Some(src.1),
            tp_dst: Some(dst.1),
            tcp_flags: Some(flags),
            ..Self::ip(dl_src, dl_dst, src.0, dst.0, protocol::TCP)
        }
    }

    /// L2 + IP + UDP fields
    pub fn udp(dl_src: MacAddr, dl_dst: MacAddr, src: (IpAddr, u16), dst: (IpAddr, u16)) -> Self {
        Self {
            tp_src: Some(src.1),
            tp_dst: Some(dst.1),
            ..Self::ip(dl_src, dl_dst, src.0, dst.0, protocol::UDP)
        }
    }

    /// Extract fields from a raw Ethernet frame.
    ///
    /// Only the Ethernet header is mandatory. A malformed IP header leaves
    /// the packet looking like plain L2 traffic, a malformed L4 header leaves
    /// the ports unset.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let frame = Frame::parse(frame)?;
        let mut fields = Self::ethernet(frame.src_mac(), frame.dst_mac(), frame.ethertype());
        fields.dl_vlan = frame.vlan_tag().map(|tag| tag.vid);

        let l4 = match EtherType::from_u16(fields.dl_type) {
            Some(EtherType::Ipv4) => match Ipv4Header::parse(frame.payload()) {
                Ok(ip) => {
                    fields.nw_src = Some(IpAddr::V4(ip.src_addr()));
                    fields.nw_dst = Some(IpAddr::V4(ip.dst_addr()));
                    fields.nw_proto = Some(ip.protocol());
                    // Non-first fragments carry no L4 header
                    (ip.fragment_offset() == 0).then(|| (ip.protocol(), ip.payload()))
                }
                Err(_) => None,
            },
            Some(EtherType::Ipv6) => match Ipv6Header::parse(frame.payload()) {
                Ok(ip) => {
                    fields.nw_src = Some(IpAddr::V6(ip.src_addr()));
                    fields.nw_dst = Some(IpAddr::V6(ip.dst_addr()));
                    fields.nw_proto = Some(ip.next_header());
                    Some((ip.next_header(), ip.payload()))
                }
                Err(_) => None,
            },
            _ => None,
        };

        if let Some((proto, payload)) = l4 {
            fields.extract_ports(proto, payload);
        }

        Ok(fields)
    }

    fn extract_ports(&mut self, proto: u8, payload: &[u8]) {
        match proto {
            protocol::TCP => {
                if let Ok(tcp) = TcpHeader::parse(payload) {
                    self.tp_src = Some(tcp.src_port());
                    self.tp_dst = Some(tcp.dst_port());
                    self.tcp_flags = Some(tcp.flags());
                }
            }
            protocol::UDP => {
                if let Ok(udp) = UdpHeader::parse(payload) {
                    self.tp_src = Some(udp.src_port());
                    self.tp_dst = Some(udp.dst_port());
                }
            }
            _ => {}
        }
    }

    /// Source and destination IP, if the packet carries an IP payload
    pub fn ip_endpoints(&self) -> Option<(IpAddr, IpAddr)> {
        Some((self.nw_src?, self.nw_dst?))
    }

    pub fn is_tcp(&self) -> bool {
        self.nw_proto == Some(protocol::TCP) && self.tcp_flags.is_some()
    }

    /// TCP or UDP with both ports known
    pub fn has_ports(&self) -> bool {
        matches!(self.nw_proto, Some(protocol::TCP) | Some(protocol::UDP))
            && self.tp_src.is_some()
            && self.tp_dst.is_some()
    }

    /// Link-local control traffic a learning switch must not forward
    pub fn is_link_local(&self) -> bool {
        self.dl_type == EtherType::Lldp as u16 || self.dl_dst.is_bridge_filtered()
    }
}

/// A packet punted to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    /// Port the packet arrived on
    pub in_port: PortNo,
    /// Switch-side buffer holding the packet, if any
    pub buffer_id: Option<u32>,
    pub fields: PacketFields,
    /// Raw frame; needed to emit the packet when it is not buffered
    pub data: Vec<u8>,
}

impl PacketIn {
    /// Packet-in with fields already parsed by the transport
    pub fn new(in_port: PortNo, buffer_id: Option<u32>, fields: PacketFields) -> Self {
        Self {
            in_port,
            buffer_id,
            fields,
            data: Vec::new(),
        }
    }

    /// Packet-in carrying the raw frame
    pub fn from_frame(in_port: PortNo, buffer_id: Option<u32>, data: Vec<u8>) -> Result<Self> {
        let fields = PacketFields::parse(&data)?;
        Ok(Self {
            in_port,
            buffer_id,
            fields,
            data,
        })
    }
}
