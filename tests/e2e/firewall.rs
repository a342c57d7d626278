//! Stateful firewall through the controller

use crate::harness::{flags, host_mac, ip, tcp, Lab, FIREWALL_CONFIG};
use flowgate::dataplane::{Action, Command, OutPort};

const INSIDE: &str = "192.168.1.10";
const OUTSIDE: &str = "172.16.0.5";

#[tokio::test]
async fn test_outbound_syn_opens_connection() {
    let lab = Lab::new(FIREWALL_CONFIG);
    lab.controller.on_connect(1);

    let sent = lab
        .exchange(
            1,
            vec![tcp(
                1,
                (host_mac(1), INSIDE, 40000),
                (host_mac(2), OUTSIDE, 80),
                flags(true, false, false, false),
                1,
            )],
        )
        .await;

    assert_eq!(sent.len(), 1);
    assert!(sent[0].actions().contains(&Action::Output(OutPort::Flood)));
    assert_eq!(lab.metrics.firewall_blocks.get(), 0);

    // The SYN-ACK is answered traffic and is forwarded to the learned port
    let sent = lab
        .exchange(
            1,
            vec![tcp(
                2,
                (host_mac(2), OUTSIDE, 80),
                (host_mac(1), INSIDE, 40000),
                flags(true, true, false, false),
                2,
            )],
        )
        .await;
    assert!(sent[0].is_flow_mod());
    assert_eq!(sent[0].actions(), &[Action::Output(OutPort::Physical(1))]);
    assert_eq!(lab.metrics.firewall_blocks.get(), 0);
}

#[tokio::test]
async fn test_unsolicited_inbound_syn_installs_timed_block() {
    let lab = Lab::new(FIREWALL_CONFIG);
    lab.controller.on_connect(1);

    let sent = lab
        .exchange(
            1,
            vec![tcp(
                2,
                (host_mac(2), OUTSIDE, 5555),
                (host_mac(1), INSIDE, 22),
                flags(true, false, false, false),
                9,
            )],
        )
        .await;

    assert_eq!(sent.len(), 1);
    match &sent[0] {
        Command::FlowMod {
            flow_match,
            actions,
            idle_timeout,
            hard_timeout,
            buffer_id,
        } => {
            assert!(actions.is_empty());
            assert_eq!(flow_match.in_port, None);
            assert_eq!(flow_match.nw_src, Some(ip(OUTSIDE)));
            assert_eq!(flow_match.nw_dst, Some(ip(INSIDE)));
            assert_eq!(flow_match.tp_src, Some(5555));
            assert_eq!(flow_match.tp_dst, Some(22));
            assert_eq!(flow_match.nw_proto, Some(6));
            assert_eq!((*idle_timeout, *hard_timeout), (10, 10));
            assert_eq!(*buffer_id, Some(9));
        }
        other => panic!("expected drop flow, got {:?}", other),
    }
    assert_eq!(lab.metrics.firewall_blocks.get(), 1);
}

#[tokio::test]
async fn test_reset_closes_connection() {
    let lab = Lab::new(FIREWALL_CONFIG);
    lab.controller.on_connect(1);

    let sent = lab
        .exchange(
            1,
            vec![
                tcp(
                    1,
                    (host_mac(1), INSIDE, 40001),
                    (host_mac(2), OUTSIDE, 443),
                    flags(true, false, false, false),
                    1,
                ),
                tcp(
                    1,
                    (host_mac(1), INSIDE, 40001),
                    (host_mac(2), OUTSIDE, 443),
                    flags(false, false, false, true),
                    2,
                ),
                tcp(
                    2,
                    (host_mac(2), OUTSIDE, 443),
                    (host_mac(1), INSIDE, 40001),
                    flags(false, true, false, false),
                    3,
                ),
            ],
        )
        .await;

    assert_eq!(sent.len(), 3);
    assert!(sent[2].is_flow_mod());
    assert!(sent[2].actions().is_empty());
    assert_eq!(lab.metrics.firewall_blocks.get(), 1);
}

#[tokio::test]
async fn test_connections_are_per_switch() {
    let lab = Lab::new(FIREWALL_CONFIG);
    lab.controller.on_connect(1);
    lab.controller.on_connect(2);

    lab.exchange(
        1,
        vec![tcp(
            1,
            (host_mac(1), INSIDE, 40002),
            (host_mac(2), OUTSIDE, 80),
            flags(true, false, false, false),
            1,
        )],
    )
    .await;

    // Return traffic arriving at another switch was never seen leaving
    let sent = lab
        .exchange(
            2,
            vec![tcp(
                2,
                (host_mac(2), OUTSIDE, 80),
                (host_mac(1), INSIDE, 40002),
                flags(true, true, false, false),
                2,
            )],
        )
        .await;
    assert!(sent[0].is_flow_mod());
    assert!(sent[0].actions().is_empty());
}
