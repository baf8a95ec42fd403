// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orion_core::Role;

fn member(id: &str, port: u16) -> Member {
    Member {
        id: id.to_string(),
        addr: format!("127.0.0.1:{port}").parse().unwrap(),
        meta: NodeMeta {
            id: id.to_string(),
            role: Role::Worker,
            mem_total: 1024,
            mem_used: 0,
            cpu_total: 2.0,
            consensus_port: port + 1,
        },
        incarnation: 1,
        state: MemberState::Alive,
    }
}

#[test]
fn consensus_addr_joins_gossip_ip_and_meta_port() {
    let m = member("a", 7946);
    assert_eq!(m.consensus_addr(), "127.0.0.1:7947");
}

#[test]
fn datagram_round_trip() {
    let datagram = Datagram {
        msg: Gossip::PingReq { seq: 9, from: "a".to_string(), target: member("b", 8000) },
        updates: vec![member("c", 9000)],
    };

    let bytes = datagram.encode().unwrap();
    let decoded = Datagram::decode(&bytes).unwrap();

    match decoded.msg {
        Gossip::PingReq { seq, from, target } => {
            assert_eq!(seq, 9);
            assert_eq!(from, "a");
            assert_eq!(target.id, "b");
        }
        other => panic!("unexpected message: {other:?}"),
    }
    assert_eq!(decoded.updates.len(), 1);
    assert_eq!(decoded.updates[0].id, "c");
}

#[test]
fn datagram_updates_default_empty() {
    let bytes = br#"{"msg":{"Ping":{"seq":1,"from":"a"}}}"#;
    let decoded = Datagram::decode(bytes).unwrap();
    assert!(decoded.updates.is_empty());
}

#[test]
fn member_state_display() {
    assert_eq!(MemberState::Alive.to_string(), "alive");
    assert_eq!(MemberState::Suspect.to_string(), "suspect");
    assert_eq!(MemberState::Dead.to_string(), "dead");
    assert_eq!(MemberState::Left.to_string(), "left");
}
