//! Connection tracking for the stateful TCP firewall
//!
//! Connections are keyed by their outbound 4-tuple. A return packet belongs
//! to an established connection iff its reversed tuple is tracked.
//!
//! Per-key lifecycle is deliberately minimal:
//!
//! ```text
//! None --(outbound SYN w/o ACK)--> Open --(FIN or RST, either side)--> Closed
//! ```
//!
//! `Closed` entries are dropped from the table, so the key is back to `None`.
//! No half-open or half-closed states are modelled.

use super::fields::PacketFields;
use crate::protocol::tcp::TcpFlags;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Directional connection key (outbound direction is canonical)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnKey {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
}

impl ConnKey {
    pub fn new(src_ip: IpAddr, src_port: u16, dst_ip: IpAddr, dst_port: u16) -> Self {
        Self {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
        }
    }

    /// Key as seen from the packet's own direction
    pub fn from_fields(fields: &PacketFields) -> Option<Self> {
        Some(Self::new(
            fields.nw_src?,
            fields.tp_src?,
            fields.nw_dst?,
            fields.tp_dst?,
        ))
    }

    /// Swap source and destination
    pub fn reverse(&self) -> Self {
        Self {
            src_ip: self.dst_ip,
            src_port: self.dst_port,
            dst_ip: self.src_ip,
            dst_port: self.src_port,
        }
    }
}

impl fmt::Display for ConnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// What a TCP packet means to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnEvent {
    /// SYN without ACK leaving the inside zone
    OutboundSyn,
    /// FIN or RST in either direction
    FinOrRst,
    /// Any other segment of the flow
    Other,
}

impl ConnEvent {
    /// Classify an outbound segment. SYN takes precedence over FIN/RST.
    pub fn outbound(flags: TcpFlags) -> Self {
        if flags.is_syn_only() {
            ConnEvent::OutboundSyn
        } else if flags.is_fin_or_rst() {
            ConnEvent::FinOrRst
        } else {
            ConnEvent::Other
        }
    }

    /// Classify an inbound segment; inbound traffic can never open a connection.
    pub fn inbound(flags: TcpFlags) -> Self {
        if flags.is_fin_or_rst() {
            ConnEvent::FinOrRst
        } else {
            ConnEvent::Other
        }
    }
}

/// Per-key connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    None,
    Open {
        opened_at: Instant,
        last_seen: Instant,
    },
    Closed,
}

impl ConnState {
    /// Apply one event. Legal transitions are `None -> Open` on
    /// `OutboundSyn` and `Open -> Closed` on `FinOrRst`; traffic on an open
    /// connection only refreshes `last_seen`. Anything else is a no-op.
    pub fn on_event(self, event: ConnEvent, now: Instant) -> Self {
        match (self, event) {
            (ConnState::None, ConnEvent::OutboundSyn) => ConnState::Open {
                opened_at: now,
                last_seen: now,
            },
            (ConnState::Open { .. }, ConnEvent::FinOrRst) => ConnState::Closed,
            (ConnState::Open { opened_at, .. }, _) => ConnState::Open {
                opened_at,
                last_seen: now,
            },
            (state, _) => state,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ConnState::Open { .. })
    }
}

/// Tracked connections of one switch session
#[derive(Debug, Default)]
pub struct ConnectionTable {
    /// Outbound key -> state; only `Open` states are stored
    entries: HashMap<ConnKey, ConnState>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of an outbound key
    pub fn state(&self, key: &ConnKey) -> ConnState {
        self.entries.get(key).copied().unwrap_or(ConnState::None)
    }

    pub fn is_established(&self, key: &ConnKey) -> bool {
        self.state(key).is_open()
    }

    /// Drive the state machine for `key` and store the outcome
    pub fn apply(&mut self, key: ConnKey, event: ConnEvent, now: Instant) -> ConnState {
        let current = self.state(&key);
        let next = current.on_event(event, now);

        match next {
            ConnState::Open { .. } => {
                self.entries.insert(key, next);
            }
            ConnState::None | ConnState::Closed => {
                self.entries.remove(&key);
            }
        }

        if current.is_open() != next.is_open() {
            debug!(
                connection = %key,
                ?event,
                active = self.entries.len(),
                "connection {}",
                if next.is_open() { "opened" } else { "closed" }
            );
        }

        next
    }

    /// Outbound segment for `key`: SYN without ACK opens, FIN/RST closes.
    pub fn observe_outbound(
        &mut self,
        key: ConnKey,
        syn_no_ack: bool,
        fin_or_rst: bool,
        now: Instant,
    ) -> ConnState {
        let event = if syn_no_ack {
            ConnEvent::OutboundSyn
        } else if fin_or_rst {
            ConnEvent::FinOrRst
        } else {
            ConnEvent::Other
        };
        self.apply(key, event, now)
    }

    /// Inbound segment with its own (inbound) key. FIN/RST tears down the
    /// matching outbound connection first; returns whether the packet
    /// belongs to an established connection afterwards.
    pub fn observe_inbound(&mut self, key: ConnKey, fin_or_rst: bool, now: Instant) -> bool {
        let outbound = key.reverse();
        let event = if fin_or_rst {
            ConnEvent::FinOrRst
        } else {
            ConnEvent::Other
        };
        self.apply(outbound, event, now).is_open()
    }

    /// Drop connections idle for longer than `max_age`. Returns the number removed.
    pub fn age_out(&mut self, max_age: Duration, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, state| match state {
            ConnState::Open { last_seen, .. } => {
                now.saturating_duration_since(*last_seen) < max_age
            }
            ConnState::None | ConnState::Closed => false,
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outbound keys of all open connections
    pub fn keys(&self) -> impl Iterator<Item = &ConnKey> {
        self.entries.keys()
    }
}
