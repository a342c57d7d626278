//! NAT at the controller boundary

use crate::harness::{flags, host_mac, ip, tcp, Lab, NAT_CONFIG};
use flowgate::dataplane::{Action, Command, PacketFields, PacketIn};

const PUBLIC: &str = "128.128.129.1";
const SERVER: &str = "8.8.8.8";

fn syn(host: &str, port: u16, buffer_id: u32) -> PacketIn {
    tcp(
        1,
        (host_mac(1), host, port),
        (host_mac(9), SERVER, 80),
        flags(true, false, false, false),
        buffer_id,
    )
}

#[tokio::test]
async fn test_outbound_is_rewritten_to_public_address() {
    let lab = Lab::new(NAT_CONFIG);
    lab.controller.on_connect(1);

    let sent = lab.exchange(1, vec![syn("192.168.1.10", 1234, 1)]).await;

    let actions = sent[0].actions();
    assert_eq!(actions[0], Action::SetNwSrc(ip(PUBLIC)));
    assert_eq!(actions[1], Action::SetTpSrc(50000));
    assert_eq!(lab.metrics.nat_translations.get(), 1);
}

#[tokio::test]
async fn test_return_traffic_is_translated_back() {
    let lab = Lab::new(NAT_CONFIG);
    lab.controller.on_connect(1);

    lab.exchange(1, vec![syn("192.168.1.10", 1234, 1)]).await;
    let sent = lab
        .exchange(
            1,
            vec![tcp(
                2,
                (host_mac(9), SERVER, 80),
                (host_mac(1), PUBLIC, 50000),
                flags(true, true, false, false),
                2,
            )],
        )
        .await;

    assert_eq!(lab.metrics.firewall_blocks.get(), 0);
    let actions = sent[0].actions();
    assert!(actions.contains(&Action::SetNwDst(ip("192.168.1.10"))));
    assert!(actions.contains(&Action::SetTpDst(1234)));
}

#[tokio::test]
async fn test_unmapped_inbound_is_dropped() {
    let lab = Lab::new(NAT_CONFIG);
    lab.controller.on_connect(1);

    let sent = lab
        .exchange(
            1,
            vec![tcp(
                2,
                (host_mac(9), SERVER, 80),
                (host_mac(1), PUBLIC, 50001),
                flags(true, false, false, false),
                4,
            )],
        )
        .await;

    assert!(matches!(&sent[0], Command::PacketOut { buffer_id: Some(4), actions, .. } if actions.is_empty()));
    assert_eq!(lab.metrics.nat_unmapped.get(), 1);
}

#[tokio::test]
async fn test_pool_exhaustion_drops_new_flows() {
    let lab = Lab::new(NAT_CONFIG);
    lab.controller.on_connect(1);

    let sent = lab
        .exchange(
            1,
            vec![
                syn("192.168.1.10", 1000, 1),
                syn("192.168.1.11", 1000, 2),
                syn("192.168.1.12", 1000, 3),
                // Existing bindings keep working
                syn("192.168.1.10", 1000, 4),
            ],
        )
        .await;

    assert_eq!(sent.len(), 4);
    assert!(matches!(&sent[2], Command::PacketOut { buffer_id: Some(3), actions, .. } if actions.is_empty()));
    assert!(sent[3].actions().contains(&Action::SetTpSrc(50000)));
    assert_eq!(lab.metrics.nat_pool_exhausted.get(), 1);
    assert_eq!(lab.controller.engine().nat().unwrap().bindings(), 2);
}

#[tokio::test]
async fn test_pool_is_shared_between_switches() {
    let lab = Lab::new(NAT_CONFIG);
    lab.controller.on_connect(1);
    lab.controller.on_connect(2);

    let first = lab.exchange(1, vec![syn("192.168.1.10", 1000, 1)]).await;
    let second = lab.exchange(2, vec![syn("192.168.1.20", 1000, 2)]).await;
    let third = lab.exchange(1, vec![syn("192.168.1.30", 1000, 3)]).await;

    assert!(first[0].actions().contains(&Action::SetTpSrc(50000)));
    assert!(second[0].actions().contains(&Action::SetTpSrc(50001)));
    assert!(third[0].actions().is_empty());
}

#[tokio::test]
async fn test_udp_reply_through_binding() {
    let lab = Lab::new(NAT_CONFIG);
    lab.controller.on_connect(1);

    let query = PacketIn::new(
        1,
        Some(1),
        PacketFields::udp(host_mac(1), host_mac(9), (ip("192.168.1.10"), 5353), (ip(SERVER), 53)),
    );
    let reply = PacketIn::new(
        2,
        Some(2),
        PacketFields::udp(host_mac(9), host_mac(1), (ip(SERVER), 53), (ip(PUBLIC), 50000)),
    );
    let sent = lab.exchange(1, vec![query, reply]).await;

    assert_eq!(sent.len(), 2);
    assert!(sent[1].is_flow_mod());
    assert!(sent[1].actions().contains(&Action::SetNwDst(ip("192.168.1.10"))));
    assert!(sent[1].actions().contains(&Action::SetTpDst(5353)));
    assert_eq!(lab.metrics.firewall_blocks.get(), 0);
}
