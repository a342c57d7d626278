//! Per-switch state

use super::conntrack::ConnectionTable;
use super::fdb::MacTable;
use std::fmt;
use std::time::{Duration, Instant};

/// OpenFlow datapath id
pub type SwitchId = u64;

/// Displays a datapath id the way switches print it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dpid(pub SwitchId);

impl fmt::Display for Dpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// When the next table sweep is due
///
/// Polled after every event as well as on a timer, so a busy session still
/// ages its tables.
#[derive(Debug, Clone)]
pub struct SweepSchedule {
    period: Duration,
    next: Instant,
}

impl SweepSchedule {
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next: start + period,
        }
    }

    /// `true` if a sweep is due at `now`; the next one is then one period later
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.period;
        true
    }
}

/// Everything the controller knows about one connected switch.
///
/// Owned by exactly one task; nothing in here is shared between switches.
#[derive(Debug)]
pub struct SwitchSession {
    id: SwitchId,
    connected_at: Instant,
    hold_down_expired: bool,
    pub macs: MacTable,
    pub conns: ConnectionTable,
}

impl SwitchSession {
    pub fn new(id: SwitchId, now: Instant) -> Self {
        Self {
            id,
            connected_at: now,
            hold_down_expired: false,
            macs: MacTable::new(),
            conns: ConnectionTable::new(),
        }
    }

    pub fn id(&self) -> SwitchId {
        self.id
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Whether floods are still suppressed at `now`
    pub fn in_hold_down(&self, hold_down: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.connected_at) < hold_down
    }

    /// Mark the hold-down as over. Returns `true` only the first time.
    pub fn expire_hold_down(&mut self) -> bool {
        !std::mem::replace(&mut self.hold_down_expired, true)
    }

    pub fn hold_down_expired(&self) -> bool {
        self.hold_down_expired
    }

    /// Sweep both tables; `None` skips a table. Returns (macs, connections) removed.
    pub fn age_out(
        &mut self,
        mac_max_age: Option<Duration>,
        conn_max_age: Option<Duration>,
        now: Instant,
    ) -> (usize, usize) {
        let macs = mac_max_age.map_or(0, |age| self.macs.age_out(age, now));
        let conns = conn_max_age.map_or(0, |age| self.conns.age_out(age, now));
        (macs, conns)
    }
}
