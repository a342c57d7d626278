//! In-process lab: a controller built from TOML plus a programmer that
//! records everything sent to the switches.

use flowgate::config;
use flowgate::controller::Controller;
use flowgate::dataplane::{
    Command, FlowProgrammer, PacketFields, PacketIn, PortNo, SwitchId,
};
use flowgate::protocol::tcp::TcpFlags;
use flowgate::protocol::{EtherType, MacAddr};
use flowgate::telemetry::MetricsRegistry;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Inside zone 192.168.1.0/24, firewall on, no NAT
pub const FIREWALL_CONFIG: &str = r#"
[[zones]]
name = "inside"
cidr = "192.168.1.0/24"

[[zones]]
name = "outside"
cidr = "172.16.0.0/12"
"#;

/// Firewall plus a two-port NAT pool
pub const NAT_CONFIG: &str = r#"
[[zones]]
name = "inside"
cidr = "192.168.1.0/24"

[nat]
public_address = "128.128.129.1"
port_range_start = 50000
port_range_end = 50001
"#;

#[derive(Default)]
pub struct RecordingProgrammer {
    sent: Mutex<Vec<(SwitchId, Command)>>,
}

impl RecordingProgrammer {
    /// Drain everything recorded so far
    pub fn take(&self) -> Vec<(SwitchId, Command)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn take_for(&self, switch: SwitchId) -> Vec<Command> {
        self.take()
            .into_iter()
            .filter(|(s, _)| *s == switch)
            .map(|(_, c)| c)
            .collect()
    }
}

impl FlowProgrammer for RecordingProgrammer {
    fn send(&self, switch: SwitchId, command: Command) {
        self.sent.lock().unwrap().push((switch, command));
    }
}

pub struct Lab {
    pub controller: Controller,
    pub programmer: Arc<RecordingProgrammer>,
    pub metrics: Arc<MetricsRegistry>,
}

impl Lab {
    pub fn new(toml: &str) -> Self {
        let config = config::parse(toml).expect("lab config");
        assert!(!config::validate(&config).has_errors());

        let metrics = Arc::new(MetricsRegistry::new());
        let engine = config::build_engine(&config, Arc::clone(&metrics)).expect("engine");
        let programmer = Arc::new(RecordingProgrammer::default());
        let controller = Controller::new(engine, programmer.clone(), config.aging.clone());

        Self {
            controller,
            programmer,
            metrics,
        }
    }

    /// Deliver packets to one switch and return what it was sent in reply
    pub async fn exchange(&self, switch: SwitchId, packets: Vec<PacketIn>) -> Vec<Command> {
        for pkt in packets {
            self.controller.on_packet_in(switch, pkt).expect("switch connected");
        }
        self.controller.barrier(switch).await.expect("barrier");
        self.programmer.take_for(switch)
    }
}

pub fn host_mac(n: u8) -> MacAddr {
    MacAddr([0x00, 0x00, 0x00, 0x00, 0x00, n])
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn flags(syn: bool, ack: bool, fin: bool, rst: bool) -> TcpFlags {
    TcpFlags {
        syn,
        ack,
        fin,
        rst,
        ..Default::default()
    }
}

/// Buffered ARP frame
pub fn arp(in_port: PortNo, src: MacAddr, dst: MacAddr, buffer_id: u32) -> PacketIn {
    PacketIn::new(
        in_port,
        Some(buffer_id),
        PacketFields::ethernet(src, dst, EtherType::Arp as u16),
    )
}

/// Buffered TCP segment
pub fn tcp(
    in_port: PortNo,
    (src_mac, src_ip, src_port): (MacAddr, &str, u16),
    (dst_mac, dst_ip, dst_port): (MacAddr, &str, u16),
    tcp_flags: TcpFlags,
    buffer_id: u32,
) -> PacketIn {
    PacketIn::new(
        in_port,
        Some(buffer_id),
        PacketFields::tcp(
            src_mac,
            dst_mac,
            (ip(src_ip), src_port),
            (ip(dst_ip), dst_port),
            tcp_flags,
        ),
    )
}
