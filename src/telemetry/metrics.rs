//! Decision counters.
//!
//! Thread-safe counters for packet-in outcomes, kept globally and per
//! switch. Every drop reason has its own counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-switch statistics.
#[derive(Debug, Default)]
pub struct SwitchStats {
    /// Packet-in events handled.
    pub packet_in: Counter,
    /// Bytes of raw frame data received with packet-ins.
    pub packet_in_bytes: Counter,
    /// Commands sent back to the switch.
    pub commands: Counter,
    /// Packets dropped or blocked for any reason.
    pub drops: Counter,
}

impl SwitchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet_in(&self, bytes: usize) {
        self.packet_in.inc();
        self.packet_in_bytes.add(bytes as u64);
    }

    pub fn record_commands(&self, count: usize) {
        self.commands.add(count as u64);
    }

    pub fn record_drop(&self) {
        self.drops.inc();
    }
}

/// Global metrics registry for the controller.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    switches: RwLock<HashMap<u64, SwitchStats>>,

    // Forwarding
    pub packet_in: Counter,
    pub floods: Counter,
    /// Floods suppressed during the post-connect hold-down.
    pub floods_held_down: Counter,
    pub forwards: Counter,
    pub flows_installed: Counter,
    /// Sessions whose flood hold-down ran out.
    pub hold_down_expired: Counter,

    // Drops, one per reason
    pub link_local_drops: Counter,
    pub firewall_blocks: Counter,
    pub loop_blocks: Counter,
    pub nat_pool_exhausted: Counter,
    pub nat_unmapped: Counter,

    // NAT
    pub nat_translations: Counter,
    pub nat_bindings_expired: Counter,

    // Aging
    pub macs_aged: Counter,
    pub connections_aged: Counter,

    /// Currently connected switches.
    pub connected_switches: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a switch; existing counters are kept on reconnect.
    pub fn register_switch(&self, switch: u64) {
        let mut switches = self
            .switches
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        switches.entry(switch).or_default();
        self.connected_switches
            .store(switches.len() as u64, Ordering::Relaxed);
    }

    pub fn unregister_switch(&self, switch: u64) {
        let mut switches = self
            .switches
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        switches.remove(&switch);
        self.connected_switches
            .store(switches.len() as u64, Ordering::Relaxed);
    }

    /// Runs `f` against a switch's stats if it is registered.
    pub fn with_switch(&self, switch: u64, f: impl FnOnce(&SwitchStats)) {
        let switches = self.switches.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(stats) = switches.get(&switch) {
            f(stats);
        }
    }

    /// Total drops across every reason.
    pub fn total_drops(&self) -> u64 {
        self.link_local_drops.get()
            + self.firewall_blocks.get()
            + self.loop_blocks.get()
            + self.nat_pool_exhausted.get()
            + self.nat_unmapped.get()
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("packet_in".into(), self.packet_in.get()),
            ("floods".into(), self.floods.get()),
            ("floods_held_down".into(), self.floods_held_down.get()),
            ("forwards".into(), self.forwards.get()),
            ("flows_installed".into(), self.flows_installed.get()),
            ("hold_down_expired".into(), self.hold_down_expired.get()),
            ("link_local_drops".into(), self.link_local_drops.get()),
            ("firewall_blocks".into(), self.firewall_blocks.get()),
            ("loop_blocks".into(), self.loop_blocks.get()),
            ("nat_pool_exhausted".into(), self.nat_pool_exhausted.get()),
            ("nat_unmapped".into(), self.nat_unmapped.get()),
            ("nat_translations".into(), self.nat_translations.get()),
            ("nat_bindings_expired".into(), self.nat_bindings_expired.get()),
            ("macs_aged".into(), self.macs_aged.get()),
            ("connections_aged".into(), self.connections_aged.get()),
            (
                "connected_switches".into(),
                self.connected_switches.load(Ordering::Relaxed),
            ),
        ];

        let switches = self.switches.read().unwrap_or_else(PoisonError::into_inner);
        for (id, stats) in switches.iter() {
            result.extend([
                (format!("switch_{:016x}_packet_in", id), stats.packet_in.get()),
                (
                    format!("switch_{:016x}_packet_in_bytes", id),
                    stats.packet_in_bytes.get(),
                ),
                (format!("switch_{:016x}_commands", id), stats.commands.get()),
                (format!("switch_{:016x}_drops", id), stats.drops.get()),
            ]);
        }

        result
    }
}
