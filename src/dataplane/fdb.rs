//! MAC learning table
//!
//! One table per switch session, mapping a hardware address to the port it
//! was last seen on. Learning is unconditional: every packet-in overwrites
//! the entry for its source address. Entries are only removed by the
//! optional aging sweep or when a port goes away.

use super::fields::PortNo;
use crate::protocol::MacAddr;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct MacEntry {
    port: PortNo,
    last_seen: Instant,
}

/// Hardware address -> ingress port
#[derive(Debug, Default)]
pub struct MacTable {
    entries: HashMap<MacAddr, MacEntry>,
}

impl MacTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `mac` was seen on `port` (last write wins)
    pub fn learn(&mut self, mac: MacAddr, port: PortNo, now: Instant) {
        self.entries.insert(
            mac,
            MacEntry {
                port,
                last_seen: now,
            },
        );
    }

    /// Port `mac` was last seen on; `None` means flood
    pub fn lookup(&self, mac: &MacAddr) -> Option<PortNo> {
        self.entries.get(mac).map(|entry| entry.port)
    }

    /// Forget every address learned on `port`
    pub fn remove_port(&mut self, port: PortNo) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.port != port);
        before - self.entries.len()
    }

    /// Remove entries not refreshed within `max_age`. Returns the number removed.
    pub fn age_out(&mut self, max_age: Duration, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) < max_age);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
