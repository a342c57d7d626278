//! Offline replay of recorded switch events
//!
//! A trace is a TOML file of timestamped events. Replaying drives the same
//! engine and sessions the controller uses, on a synthetic clock, so flood
//! hold-down follows trace time. Table aging runs on the same clock: due
//! sweeps are applied before the event that reaches them.
//!
//! ```toml
//! [[events]]
//! at_ms = 0
//! type = "connect"
//! switch = 1
//!
//! [[events]]
//! at_ms = 20
//! type = "packet_in"
//! switch = 1
//! in_port = 1
//! buffer_id = 7
//! fields = { dl_src = "00:00:00:00:00:01", dl_dst = "ff:ff:ff:ff:ff:ff", dl_type = 2054 }
//! ```

use crate::config::AgingConfig;
use crate::dataplane::{
    Dpid, FlowEngine, FlowProgrammer, PacketFields, PacketIn, PortNo, SweepSchedule, SwitchId,
    SwitchSession, Verdict,
};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub events: Vec<TraceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceEntry {
    /// Offset from the start of the trace
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: TraceEvent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    Connect {
        switch: SwitchId,
    },
    PacketIn {
        switch: SwitchId,
        in_port: PortNo,
        #[serde(default)]
        buffer_id: Option<u32>,
        fields: PacketFields,
    },
    PortDown {
        switch: SwitchId,
        port: PortNo,
    },
    Disconnect {
        switch: SwitchId,
    },
}

impl Trace {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Parse(format!("trace: {}", e)))
    }
}

/// One packet-in decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub at_ms: u64,
    pub switch: SwitchId,
    pub verdict: Verdict,
}

#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub decisions: Vec<Decision>,
    /// Events addressed to a switch that was not connected
    pub skipped: usize,
}

/// Replay `trace` in timestamp order. Events with equal timestamps keep
/// their file order.
pub fn run(
    trace: &Trace,
    engine: &FlowEngine,
    programmer: &dyn FlowProgrammer,
    aging: &AgingConfig,
) -> ReplaySummary {
    let start = Instant::now();
    let mut sessions: HashMap<SwitchId, SwitchSession> = HashMap::new();
    let mut summary = ReplaySummary::default();
    let mut schedule = SweepSchedule::new(aging.sweep_interval(), start);

    let mut entries: Vec<&TraceEntry> = trace.events.iter().collect();
    entries.sort_by_key(|entry| entry.at_ms);

    for entry in entries {
        let now = start + Duration::from_millis(entry.at_ms);

        if aging.is_enabled() && schedule.poll(now) {
            for session in sessions.values_mut() {
                engine.age_session(session, aging.mac_max_age(), aging.connection_max_age(), now);
            }
            if let Some(max_idle) = aging.nat_idle_timeout() {
                engine.expire_nat(max_idle, now);
            }
        }

        match &entry.event {
            TraceEvent::Connect { switch } => {
                sessions.insert(*switch, SwitchSession::new(*switch, now));
                info!(switch = %Dpid(*switch), at_ms = entry.at_ms, "connect");
            }
            TraceEvent::Disconnect { switch } => {
                if sessions.remove(switch).is_none() {
                    summary.skipped += 1;
                }
                info!(switch = %Dpid(*switch), at_ms = entry.at_ms, "disconnect");
            }
            TraceEvent::PortDown { switch, port } => match sessions.get_mut(switch) {
                Some(session) => {
                    session.macs.remove_port(*port);
                }
                None => summary.skipped += 1,
            },
            TraceEvent::PacketIn {
                switch,
                in_port,
                buffer_id,
                fields,
            } => {
                let session = match sessions.get_mut(switch) {
                    Some(session) => session,
                    None => {
                        warn!(error = %Error::UnknownSwitch(*switch), at_ms = entry.at_ms, "skipping packet-in");
                        summary.skipped += 1;
                        continue;
                    }
                };

                let pkt = PacketIn::new(*in_port, *buffer_id, fields.clone());
                let outcome = engine.process(session, &pkt, now);
                info!(
                    switch = %Dpid(*switch),
                    at_ms = entry.at_ms,
                    verdict = ?outcome.verdict,
                    "packet-in"
                );
                for command in outcome.commands {
                    programmer.send(*switch, command);
                }
                summary.decisions.push(Decision {
                    at_ms: entry.at_ms,
                    switch: *switch,
                    verdict: outcome.verdict,
                });
            }
        }
    }

    summary
}
