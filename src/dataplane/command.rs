//! Commands sent back to switches and the transport seam that carries them
//!
//! The decision engine never talks to a switch directly. It returns
//! [`Command`]s, and whatever owns the switch connection implements
//! [`FlowProgrammer`] to put them on the wire.

use super::fields::{PacketFields, PacketIn, PortNo};
use super::session::{Dpid, SwitchId};
use crate::protocol::MacAddr;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use tracing::info;

/// Output port of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutPort {
    Physical(PortNo),
    /// All ports except the ingress port
    Flood,
}

impl fmt::Display for OutPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutPort::Physical(port) => write!(f, "{}", port),
            OutPort::Flood => write!(f, "flood"),
        }
    }
}

/// Flow / packet-out action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Output(OutPort),
    SetNwSrc(IpAddr),
    SetNwDst(IpAddr),
    SetTpSrc(u16),
    SetTpDst(u16),
}

/// Exact match built from a packet's header fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowMatch {
    pub in_port: Option<PortNo>,
    pub dl_src: MacAddr,
    pub dl_dst: MacAddr,
    pub dl_type: u16,
    pub dl_vlan: Option<u16>,
    pub nw_src: Option<IpAddr>,
    pub nw_dst: Option<IpAddr>,
    pub nw_proto: Option<u8>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
}

impl FlowMatch {
    /// Match everything the packet carries; `in_port = None` wildcards it
    pub fn from_fields(fields: &PacketFields, in_port: Option<PortNo>) -> Self {
        Self {
            in_port,
            dl_src: fields.dl_src,
            dl_dst: fields.dl_dst,
            dl_type: fields.dl_type,
            dl_vlan: fields.dl_vlan,
            nw_src: fields.nw_src,
            nw_dst: fields.nw_dst,
            nw_proto: fields.nw_proto,
            tp_src: fields.tp_src,
            tp_dst: fields.tp_dst,
        }
    }
}

/// A message for one switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Emit a packet. An empty action list drops it (and frees the buffer).
    PacketOut {
        buffer_id: Option<u32>,
        in_port: PortNo,
        /// Raw frame; only sent when the packet is not buffered
        #[serde(skip)]
        data: Vec<u8>,
        actions: Vec<Action>,
    },
    /// Install a flow-table entry. A buffered packet is released through it.
    FlowMod {
        flow_match: FlowMatch,
        /// Empty means drop
        actions: Vec<Action>,
        idle_timeout: u16,
        hard_timeout: u16,
        buffer_id: Option<u32>,
    },
}

impl Command {
    fn packet_out(pkt: &PacketIn, actions: Vec<Action>) -> Self {
        let data = if pkt.buffer_id.is_some() {
            Vec::new()
        } else {
            pkt.data.clone()
        };
        Command::PacketOut {
            buffer_id: pkt.buffer_id,
            in_port: pkt.in_port,
            data,
            actions,
        }
    }

    /// Packet-out to every port but the ingress, after `rewrites`
    pub fn flood(pkt: &PacketIn, rewrites: &[Action]) -> Self {
        let mut actions = rewrites.to_vec();
        actions.push(Action::Output(OutPort::Flood));
        Self::packet_out(pkt, actions)
    }

    /// Packet-out to one port, after `rewrites`
    pub fn forward(pkt: &PacketIn, out_port: PortNo, rewrites: &[Action]) -> Self {
        let mut actions = rewrites.to_vec();
        actions.push(Action::Output(OutPort::Physical(out_port)));
        Self::packet_out(pkt, actions)
    }

    /// Packet-out without actions
    pub fn drop(pkt: &PacketIn) -> Self {
        Self::packet_out(pkt, Vec::new())
    }

    pub fn install_flow(
        flow_match: FlowMatch,
        actions: Vec<Action>,
        idle_timeout: u16,
        hard_timeout: u16,
        buffer_id: Option<u32>,
    ) -> Self {
        Command::FlowMod {
            flow_match,
            actions,
            idle_timeout,
            hard_timeout,
            buffer_id,
        }
    }

    /// Drop flow with idle = hard = `duration`
    pub fn timed_block(flow_match: FlowMatch, duration: u16, buffer_id: Option<u32>) -> Self {
        Self::install_flow(flow_match, Vec::new(), duration, duration, buffer_id)
    }

    pub fn is_flow_mod(&self) -> bool {
        matches!(self, Command::FlowMod { .. })
    }

    pub fn actions(&self) -> &[Action] {
        match self {
            Command::PacketOut { actions, .. } | Command::FlowMod { actions, .. } => actions,
        }
    }
}

/// Outbound side of the transport
///
/// `send` is fire-and-forget: delivery failures are the transport's problem
/// and never flow back into the decision engine.
pub trait FlowProgrammer: Send + Sync {
    fn send(&self, switch: SwitchId, command: Command);

    fn send_flood(&self, switch: SwitchId, pkt: &PacketIn, rewrites: &[Action]) {
        self.send(switch, Command::flood(pkt, rewrites));
    }

    fn send_forward(&self, switch: SwitchId, pkt: &PacketIn, out_port: PortNo, rewrites: &[Action]) {
        self.send(switch, Command::forward(pkt, out_port, rewrites));
    }

    fn install_flow(
        &self,
        switch: SwitchId,
        flow_match: FlowMatch,
        actions: Vec<Action>,
        idle_timeout: u16,
        hard_timeout: u16,
        buffer_id: Option<u32>,
    ) {
        self.send(
            switch,
            Command::install_flow(flow_match, actions, idle_timeout, hard_timeout, buffer_id),
        );
    }

    fn send_drop(&self, switch: SwitchId, pkt: &PacketIn) {
        self.send(switch, Command::drop(pkt));
    }

    fn install_timed_block(
        &self,
        switch: SwitchId,
        flow_match: FlowMatch,
        duration: u16,
        buffer_id: Option<u32>,
    ) {
        self.send(switch, Command::timed_block(flow_match, duration, buffer_id));
    }
}

/// Programmer that only logs; used when replaying traces offline
#[derive(Debug, Default)]
pub struct TracingProgrammer;

impl FlowProgrammer for TracingProgrammer {
    fn send(&self, switch: SwitchId, command: Command) {
        match &command {
            Command::PacketOut {
                buffer_id,
                in_port,
                actions,
                ..
            } => info!(
                switch = %Dpid(switch),
                ?buffer_id,
                in_port,
                ?actions,
                "packet-out"
            ),
            Command::FlowMod {
                flow_match,
                actions,
                idle_timeout,
                hard_timeout,
                buffer_id,
            } => info!(
                switch = %Dpid(switch),
                ?flow_match,
                ?actions,
                idle_timeout,
                hard_timeout,
                ?buffer_id,
                "flow-mod"
            ),
        }
    }
}
