//! Stateful TCP firewall policy
//!
//! Lets anything leave the inside zone, and only lets TCP back in when it
//! answers a connection opened from inside. Non-IP traffic is not inspected.

use super::classifier::Classifier;
use super::conntrack::{ConnEvent, ConnKey, ConnectionTable};
use super::fields::PacketFields;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Firewall verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallVerdict {
    /// Hand the packet to the forwarding stage
    Pass,
    /// Drop and install a timed block
    Block,
}

/// What to do with non-TCP IP traffic that is not leaving the inside zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonTcpPolicy {
    Pass,
    #[default]
    Block,
}

/// Traffic direction relative to the inside zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Both endpoints inside
    Internal,
    /// Inside -> not inside
    Outbound,
    /// Everything else, including traffic between unclassified addresses
    Inbound,
}

pub struct Firewall {
    classifier: Arc<Classifier>,
    inside_zone: String,
    non_tcp_inbound: NonTcpPolicy,
}

impl Firewall {
    pub fn new(
        classifier: Arc<Classifier>,
        inside_zone: impl Into<String>,
        non_tcp_inbound: NonTcpPolicy,
    ) -> Self {
        Self {
            classifier,
            inside_zone: inside_zone.into(),
            non_tcp_inbound,
        }
    }

    pub fn direction(&self, src: IpAddr, dst: IpAddr) -> Direction {
        let src_inside = self.classifier.is_in(&self.inside_zone, src);
        let dst_inside = self.classifier.is_in(&self.inside_zone, dst);
        match (src_inside, dst_inside) {
            (true, true) => Direction::Internal,
            (true, false) => Direction::Outbound,
            _ => Direction::Inbound,
        }
    }

    /// Evaluate one packet against the policy, updating `conns` as a side
    /// effect. `fields` must describe the packet as seen from the inside
    /// (i.e. after undoing NAT on inbound traffic).
    pub fn inspect(
        &self,
        conns: &mut ConnectionTable,
        fields: &PacketFields,
        now: Instant,
    ) -> FirewallVerdict {
        let (src, dst) = match fields.ip_endpoints() {
            Some(endpoints) => endpoints,
            None => return FirewallVerdict::Pass,
        };

        let tcp = fields
            .tcp_flags
            .filter(|_| fields.is_tcp())
            .and_then(|flags| ConnKey::from_fields(fields).map(|key| (key, flags)));

        match self.direction(src, dst) {
            Direction::Internal => {
                debug!(%src, %dst, "firewall: local traffic");
                FirewallVerdict::Pass
            }
            Direction::Outbound => {
                if let Some((key, flags)) = tcp {
                    debug!(connection = %key, "firewall: outbound");
                    conns.apply(key, ConnEvent::outbound(flags), now);
                }
                FirewallVerdict::Pass
            }
            Direction::Inbound => match tcp {
                Some((key, flags)) => {
                    if conns.observe_inbound(key, flags.is_fin_or_rst(), now) {
                        FirewallVerdict::Pass
                    } else {
                        debug!(connection = %key, "firewall: unsolicited inbound");
                        FirewallVerdict::Block
                    }
                }
                None => match self.non_tcp_inbound {
                    NonTcpPolicy::Pass => FirewallVerdict::Pass,
                    NonTcpPolicy::Block => {
                        debug!(%src, %dst, proto = ?fields.nw_proto, "firewall: inbound non-TCP");
                        FirewallVerdict::Block
                    }
                },
            },
        }
    }
}
