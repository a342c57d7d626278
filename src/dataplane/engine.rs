//! Flow decision engine
//!
//! Runs once per packet-in and composes the stages in a fixed order:
//!
//! ```text
//! learn src -> link-local filter -> NAT inbound -> firewall -> NAT outbound
//!           -> forward (flood / unicast flow / loop block) -> flood hold-down
//! ```
//!
//! The engine itself is stateless apart from the shared NAT boundary; all
//! per-switch state lives in the [`SwitchSession`] passed in by the caller.

use super::command::{Action, Command, FlowMatch, OutPort};
use super::fields::{PacketIn, PortNo};
use super::firewall::{Firewall, FirewallVerdict};
use super::napt::NatBoundary;
use super::session::{Dpid, SwitchId, SwitchSession};
use crate::telemetry::MetricsRegistry;
use crate::Error;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Forwarding knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Forward LLDP and bridge-filtered frames instead of dropping them
    pub transparent: bool,
    /// Suppress floods for this long after a switch connects
    pub flood_hold_down: Duration,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    /// Idle and hard timeout of drop flows
    pub block_duration: u16,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            transparent: false,
            flood_hold_down: Duration::ZERO,
            idle_timeout: 10,
            hard_timeout: 30,
            block_duration: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// LLDP or a bridge-filtered destination
    LinkLocal,
    /// Traffic to the public address with no binding behind it
    NatUnmapped,
    NatPoolExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Firewall,
    /// Destination was learned on the ingress port
    Loop,
}

/// What the engine decided for one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Flood,
    /// A flood suppressed by the post-connect hold-down
    FloodHeldDown,
    Forward { port: PortNo },
    Drop(DropReason),
    /// Dropped and matching traffic blocked for a while
    Block(BlockReason),
}

impl Verdict {
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            Verdict::Drop(_) | Verdict::Block(_) | Verdict::FloodHeldDown
        )
    }
}

/// Verdict plus the commands to send to the switch, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub verdict: Verdict,
    pub commands: Vec<Command>,
}

impl Outcome {
    fn new(verdict: Verdict, commands: Vec<Command>) -> Self {
        Self { verdict, commands }
    }
}

/// The per-packet pipeline
pub struct FlowEngine {
    settings: EngineSettings,
    firewall: Option<Firewall>,
    nat: Option<Arc<NatBoundary>>,
    /// Switches acting as the NAT boundary; empty means all
    nat_switches: Vec<SwitchId>,
    metrics: Arc<MetricsRegistry>,
}

impl FlowEngine {
    /// Plain learning switch
    pub fn new(settings: EngineSettings, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            settings,
            firewall: None,
            nat: None,
            nat_switches: Vec::new(),
            metrics,
        }
    }

    pub fn with_firewall(mut self, firewall: Firewall) -> Self {
        self.firewall = Some(firewall);
        self
    }

    pub fn with_nat(mut self, nat: Arc<NatBoundary>, switches: Vec<SwitchId>) -> Self {
        self.nat = Some(nat);
        self.nat_switches = switches;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn nat(&self) -> Option<&Arc<NatBoundary>> {
        self.nat.as_ref()
    }

    fn nat_for(&self, switch: SwitchId) -> Option<&NatBoundary> {
        let nat = self.nat.as_deref()?;
        if self.nat_switches.is_empty() || self.nat_switches.contains(&switch) {
            Some(nat)
        } else {
            None
        }
    }

    /// Decide what to do with one packet-in
    pub fn process(&self, session: &mut SwitchSession, pkt: &PacketIn, now: Instant) -> Outcome {
        let switch = session.id();
        let fields = &pkt.fields;
        self.metrics.packet_in.inc();

        session.macs.learn(fields.dl_src, pkt.in_port, now);

        if !self.settings.transparent && fields.is_link_local() {
            debug!(
                switch = %Dpid(switch),
                src = %fields.dl_src,
                dst = %fields.dl_dst,
                dl_type = %format_args!("{:#06x}", fields.dl_type),
                "dropping link-local frame"
            );
            self.metrics.link_local_drops.inc();
            return Outcome::new(Verdict::Drop(DropReason::LinkLocal), release_buffer(pkt));
        }

        let mut rewrites: Vec<Action> = Vec::new();

        if fields.ip_endpoints().is_some() {
            let nat = self.nat_for(switch);

            // The firewall judges the packet as the inside host will see it
            let mut view = Cow::Borrowed(fields);
            if let Some(nat) = nat {
                match nat.inbound(fields, now) {
                    Ok(Some(rewrite)) => {
                        debug!(switch = %Dpid(switch), ?rewrite, "NAT inbound");
                        self.metrics.nat_translations.inc();
                        view = Cow::Owned(rewrite.apply(fields));
                        rewrites = rewrite.actions();
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(
                            switch = %Dpid(switch),
                            src = ?fields.nw_src,
                            error = %err,
                            "dropping unsolicited traffic to public address"
                        );
                        self.metrics.nat_unmapped.inc();
                        return Outcome::new(
                            Verdict::Drop(DropReason::NatUnmapped),
                            release_buffer(pkt),
                        );
                    }
                }
            }

            // A live NAT binding already vouches for non-TCP return traffic
            let nat_return = !rewrites.is_empty() && !view.is_tcp();

            if let Some(firewall) = self.firewall.as_ref().filter(|_| !nat_return) {
                if firewall.inspect(&mut session.conns, &view, now) == FirewallVerdict::Block {
                    debug!(
                        switch = %Dpid(switch),
                        src = ?view.nw_src,
                        dst = ?view.nw_dst,
                        seconds = self.settings.block_duration,
                        "firewall block"
                    );
                    self.metrics.firewall_blocks.inc();
                    return Outcome::new(
                        Verdict::Block(BlockReason::Firewall),
                        vec![self.timed_block(pkt)],
                    );
                }
            }

            if let Some(nat) = nat.filter(|_| rewrites.is_empty()) {
                match nat.outbound(fields, now) {
                    Ok(Some(rewrite)) => {
                        debug!(switch = %Dpid(switch), ?rewrite, "NAT outbound");
                        self.metrics.nat_translations.inc();
                        rewrites = rewrite.actions();
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(
                            switch = %Dpid(switch),
                            src = ?fields.nw_src,
                            error = %err,
                            "dropping outbound packet"
                        );
                        self.metrics.nat_pool_exhausted.inc();
                        return Outcome::new(
                            Verdict::Drop(DropReason::NatPoolExhausted),
                            release_buffer(pkt),
                        );
                    }
                }
            }
        }

        self.forward(session, pkt, &rewrites, now)
    }

    fn forward(
        &self,
        session: &mut SwitchSession,
        pkt: &PacketIn,
        rewrites: &[Action],
        now: Instant,
    ) -> Outcome {
        let switch = session.id();
        let dst = pkt.fields.dl_dst;

        if dst.is_multicast() {
            return self.flood(session, pkt, rewrites, now);
        }

        let port = match session.macs.lookup(&dst) {
            Some(port) => port,
            None => {
                debug!(switch = %Dpid(switch), %dst, "port unknown, flooding");
                return self.flood(session, pkt, rewrites, now);
            }
        };

        if port == pkt.in_port {
            let err = Error::LoopDetected { mac: dst, port };
            warn!(
                switch = %Dpid(switch),
                src = %pkt.fields.dl_src,
                error = %err,
                "dropping"
            );
            self.metrics.loop_blocks.inc();
            return Outcome::new(Verdict::Block(BlockReason::Loop), vec![self.timed_block(pkt)]);
        }

        debug!(
            switch = %Dpid(switch),
            src = %pkt.fields.dl_src,
            in_port = pkt.in_port,
            %dst,
            out_port = port,
            "installing flow"
        );

        let mut actions = rewrites.to_vec();
        actions.push(Action::Output(OutPort::Physical(port)));
        let mut commands = vec![Command::install_flow(
            FlowMatch::from_fields(&pkt.fields, Some(pkt.in_port)),
            actions,
            self.settings.idle_timeout,
            self.settings.hard_timeout,
            pkt.buffer_id,
        )];
        // Unbuffered packets are not released by the flow-mod
        if pkt.buffer_id.is_none() {
            commands.push(Command::forward(pkt, port, rewrites));
        }

        self.metrics.forwards.inc();
        self.metrics.flows_installed.inc();
        Outcome::new(Verdict::Forward { port }, commands)
    }

    fn flood(
        &self,
        session: &mut SwitchSession,
        pkt: &PacketIn,
        rewrites: &[Action],
        now: Instant,
    ) -> Outcome {
        if session.in_hold_down(self.settings.flood_hold_down, now) {
            debug!(
                switch = %Dpid(session.id()),
                "flood suppressed during hold-down"
            );
            self.metrics.floods_held_down.inc();
            return Outcome::new(Verdict::FloodHeldDown, vec![Command::drop(pkt)]);
        }

        if session.expire_hold_down() {
            info!(
                switch = %Dpid(session.id()),
                "flood hold-down expired, flooding"
            );
            self.metrics.hold_down_expired.inc();
        }

        self.metrics.floods.inc();
        Outcome::new(Verdict::Flood, vec![Command::flood(pkt, rewrites)])
    }

    /// Drop flow on the packet as seen on the wire, any ingress port
    fn timed_block(&self, pkt: &PacketIn) -> Command {
        Command::timed_block(
            FlowMatch::from_fields(&pkt.fields, None),
            self.settings.block_duration,
            pkt.buffer_id,
        )
    }

    /// Age one session's MAC and connection tables; `None` skips a table
    pub fn age_session(
        &self,
        session: &mut SwitchSession,
        mac_max_age: Option<Duration>,
        conn_max_age: Option<Duration>,
        now: Instant,
    ) -> (usize, usize) {
        let (macs, conns) = session.age_out(mac_max_age, conn_max_age, now);
        self.metrics.macs_aged.add(macs as u64);
        self.metrics.connections_aged.add(conns as u64);
        if macs + conns > 0 {
            debug!(switch = %Dpid(session.id()), macs, connections = conns, "aged out");
        }
        (macs, conns)
    }

    /// Release NAT bindings idle for `max_idle`. Returns the number released.
    pub fn expire_nat(&self, max_idle: Duration, now: Instant) -> usize {
        let released = self.nat.as_ref().map_or(0, |nat| nat.expire_idle(max_idle, now));
        self.metrics.nat_bindings_expired.add(released as u64);
        released
    }
}

/// Free the switch buffer, if any; an unbuffered packet needs nothing
fn release_buffer(pkt: &PacketIn) -> Vec<Command> {
    if pkt.buffer_id.is_some() {
        vec![Command::drop(pkt)]
    } else {
        Vec::new()
    }
}
