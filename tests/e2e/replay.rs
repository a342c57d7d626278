//! Trace replay on a synthetic clock

use flowgate::config;
use flowgate::dataplane::{TracingProgrammer, Verdict};
use flowgate::replay::{self, Trace};
use flowgate::telemetry::MetricsRegistry;
use std::sync::Arc;

const CONFIG: &str = r#"
[switch]
flood_hold_down = 2

[[zones]]
name = "inside"
cidr = "192.168.1.0/24"
"#;

const TRACE: &str = r#"
[[events]]
at_ms = 0
type = "connect"
switch = 1

[[events]]
at_ms = 100
type = "packet_in"
switch = 1
in_port = 1
buffer_id = 1
fields = { dl_src = "00:00:00:00:00:01", dl_dst = "ff:ff:ff:ff:ff:ff", dl_type = 2054 }

[[events]]
at_ms = 1900
type = "packet_in"
switch = 1
in_port = 2
buffer_id = 2
fields = { dl_src = "00:00:00:00:00:02", dl_dst = "00:00:00:00:00:03", dl_type = 2054 }

[[events]]
at_ms = 2500
type = "packet_in"
switch = 1
in_port = 2
buffer_id = 3
fields = { dl_src = "00:00:00:00:00:02", dl_dst = "00:00:00:00:00:03", dl_type = 2054 }

[[events]]
at_ms = 2600
type = "packet_in"
switch = 1
in_port = 1
buffer_id = 4
fields = { dl_src = "00:00:00:00:00:01", dl_dst = "00:00:00:00:00:02", dl_type = 2054 }

[[events]]
at_ms = 3000
type = "disconnect"
switch = 1

[[events]]
at_ms = 3100
type = "packet_in"
switch = 1
in_port = 1
fields = { dl_src = "00:00:00:00:00:01", dl_dst = "00:00:00:00:00:02", dl_type = 2054 }
"#;

#[test]
fn test_replay_hold_down_then_forwarding() {
    let config = config::parse(CONFIG).unwrap();
    let metrics = Arc::new(MetricsRegistry::new());
    let engine = config::build_engine(&config, Arc::clone(&metrics)).unwrap();
    let trace = Trace::parse(TRACE).unwrap();

    let summary = replay::run(&trace, &engine, &TracingProgrammer, &config.aging);

    let verdicts: Vec<Verdict> = summary.decisions.iter().map(|d| d.verdict).collect();
    assert_eq!(
        verdicts,
        vec![
            Verdict::FloodHeldDown,
            Verdict::FloodHeldDown,
            Verdict::Flood,
            Verdict::Forward { port: 2 },
        ]
    );
    assert_eq!(summary.skipped, 1);
    assert_eq!(metrics.hold_down_expired.get(), 1);
    assert_eq!(metrics.floods_held_down.get(), 2);
}
