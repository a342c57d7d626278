//! Learning switch behaviour through the controller

use crate::harness::{arp, host_mac, Lab, FIREWALL_CONFIG};
use flowgate::dataplane::{Action, Command, OutPort};
use flowgate::protocol::MacAddr;

#[tokio::test]
async fn test_unknown_destination_floods() {
    let lab = Lab::new(FIREWALL_CONFIG);
    lab.controller.on_connect(1);

    let sent = lab
        .exchange(1, vec![arp(1, host_mac(1), host_mac(2), 100)])
        .await;

    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        Command::PacketOut { buffer_id: Some(100), in_port: 1, actions, .. }
            if actions == &vec![Action::Output(OutPort::Flood)]
    ));
    assert_eq!(lab.metrics.floods.get(), 1);
}

#[tokio::test]
async fn test_learned_destination_installs_flow() {
    let lab = Lab::new(FIREWALL_CONFIG);
    lab.controller.on_connect(1);

    let sent = lab
        .exchange(
            1,
            vec![
                arp(1, host_mac(1), MacAddr::BROADCAST, 1),
                arp(2, host_mac(2), host_mac(1), 2),
            ],
        )
        .await;

    assert_eq!(sent.len(), 2);
    match &sent[1] {
        Command::FlowMod {
            flow_match,
            actions,
            idle_timeout,
            hard_timeout,
            buffer_id,
        } => {
            assert_eq!(flow_match.in_port, Some(2));
            assert_eq!(flow_match.dl_src, host_mac(2));
            assert_eq!(flow_match.dl_dst, host_mac(1));
            assert_eq!(actions, &vec![Action::Output(OutPort::Physical(1))]);
            assert_eq!((*idle_timeout, *hard_timeout), (10, 30));
            assert_eq!(*buffer_id, Some(2));
        }
        other => panic!("expected flow-mod, got {:?}", other),
    }
}

#[tokio::test]
async fn test_hairpin_is_blocked() {
    let lab = Lab::new(FIREWALL_CONFIG);
    lab.controller.on_connect(1);

    let sent = lab
        .exchange(
            1,
            vec![
                arp(1, host_mac(1), MacAddr::BROADCAST, 1),
                arp(1, host_mac(2), host_mac(1), 2),
            ],
        )
        .await;

    match &sent[1] {
        Command::FlowMod {
            flow_match,
            actions,
            idle_timeout,
            hard_timeout,
            ..
        } => {
            assert!(actions.is_empty());
            assert_eq!(flow_match.in_port, None);
            assert_eq!((*idle_timeout, *hard_timeout), (10, 10));
        }
        other => panic!("expected drop flow, got {:?}", other),
    }
    assert_eq!(lab.metrics.loop_blocks.get(), 1);
}

#[tokio::test]
async fn test_switches_learn_independently() {
    let lab = Lab::new(FIREWALL_CONFIG);
    lab.controller.on_connect(1);
    lab.controller.on_connect(2);

    lab.exchange(1, vec![arp(3, host_mac(1), MacAddr::BROADCAST, 1)])
        .await;
    let sent = lab
        .exchange(2, vec![arp(4, host_mac(2), host_mac(1), 2)])
        .await;

    // Switch 2 never saw host 1
    assert!(matches!(&sent[0], Command::PacketOut { actions, .. }
        if actions == &vec![Action::Output(OutPort::Flood)]));
}

#[tokio::test]
async fn test_port_down_forgets_hosts() {
    let lab = Lab::new(FIREWALL_CONFIG);
    lab.controller.on_connect(1);

    lab.exchange(1, vec![arp(1, host_mac(1), MacAddr::BROADCAST, 1)])
        .await;
    lab.controller.on_port_down(1, 1).unwrap();
    let sent = lab
        .exchange(1, vec![arp(2, host_mac(2), host_mac(1), 2)])
        .await;

    assert!(!sent[0].is_flow_mod());
}

#[tokio::test]
async fn test_reconnect_starts_fresh() {
    let lab = Lab::new(FIREWALL_CONFIG);
    lab.controller.on_connect(1);
    lab.exchange(1, vec![arp(1, host_mac(1), MacAddr::BROADCAST, 1)])
        .await;

    lab.controller.on_disconnect(1).await.unwrap();
    assert!(lab.controller.on_packet_in(1, arp(2, host_mac(2), host_mac(1), 2)).is_err());

    lab.controller.on_connect(1);
    let sent = lab
        .exchange(1, vec![arp(2, host_mac(2), host_mac(1), 2)])
        .await;
    assert!(!sent[0].is_flow_mod());
    assert_eq!(lab.controller.connected(), vec![1]);
}

#[tokio::test]
async fn test_link_local_frames_are_dropped() {
    let lab = Lab::new(FIREWALL_CONFIG);
    lab.controller.on_connect(1);

    let lldp = MacAddr([0x01, 0x80, 0xc2, 0x00, 0x00, 0x0e]);
    let sent = lab.exchange(1, vec![arp(1, host_mac(1), lldp, 5)]).await;

    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0], Command::PacketOut { buffer_id: Some(5), actions, .. } if actions.is_empty()));
    assert_eq!(lab.metrics.link_local_drops.get(), 1);
}
