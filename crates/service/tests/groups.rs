use std::{
    net::SocketAddr,
    sync::Arc,
};

use parking_lot::Mutex;
use srtla_rec_service::{
    CloseReason, RegisterError, ServiceHandler,
    groups::{GroupId, GroupManager, MAX_CONNS_PER_GROUP, MAX_GROUPS},
};

struct Quiet;

impl ServiceHandler for Quiet {}

/// Records lifecycle events so the reaper's behavior can be asserted.
#[derive(Default)]
struct Events(Arc<Mutex<Vec<String>>>);

impl ServiceHandler for Events {
    fn on_connection_expired(&self, addr: SocketAddr, _id: &GroupId) {
        self.0.lock().push(format!("expired {addr}"));
    }

    fn on_group_closed(&self, _id: &GroupId, reason: CloseReason) {
        self.0.lock().push(format!("closed {reason:?}"));
    }
}

fn addr(port: u16) -> SocketAddr {
    format!("10.0.0.1:{port}").parse().unwrap()
}

#[test]
fn happy_handshake() {
    let manager = GroupManager::new(Quiet);
    let client_half = [0x42u8; 16];

    let id = manager.register_group(addr(5001), client_half).unwrap();
    assert_eq!(&id.as_bytes()[..16], &client_half);
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.total_connections(), 0);

    assert_eq!(manager.register_connection(addr(5001), &id), Ok(false));
    assert_eq!(manager.total_connections(), 1);

    // A second link of the same sender joins from another address.
    assert_eq!(manager.register_connection(addr(5002), &id), Ok(false));
    assert_eq!(manager.total_connections(), 2);

    // Retransmitted REG2 from an existing member is answered idempotently.
    assert_eq!(manager.register_connection(addr(5001), &id), Ok(true));
    assert_eq!(manager.total_connections(), 2);
}

#[test]
fn server_half_is_fresh_per_group() {
    let manager = GroupManager::new(Quiet);
    let client_half = [0u8; 16];

    let a = manager.register_group(addr(5001), client_half).unwrap();
    let b = manager.register_group(addr(5002), client_half).unwrap();

    assert_ne!(&a.as_bytes()[16..], &b.as_bytes()[16..]);
    assert_ne!(a.as_bytes()[16..], [0u8; 16]);
}

#[test]
fn reg1_is_refused_while_the_sender_is_active() {
    let manager = GroupManager::new(Quiet);

    let id = manager.register_group(addr(5001), [1; 16]).unwrap();

    // The registering address is blocked even before any member joined.
    assert_eq!(
        manager.register_group(addr(5001), [2; 16]),
        Err(RegisterError::AddressInUse)
    );

    // A member address is blocked too.
    manager.register_connection(addr(5002), &id).unwrap();
    assert_eq!(
        manager.register_group(addr(5002), [3; 16]),
        Err(RegisterError::AddressInUse)
    );

    assert_eq!(manager.len(), 1);
}

#[test]
fn group_capacity_is_enforced() {
    let manager = GroupManager::new(Quiet);

    for i in 0..MAX_GROUPS {
        manager.register_group(addr(1000 + i as u16), [9; 16]).unwrap();
    }

    assert_eq!(
        manager.register_group(addr(9999), [9; 16]),
        Err(RegisterError::CapacityReached)
    );
    assert_eq!(manager.len(), MAX_GROUPS);
}

#[test]
fn connection_capacity_is_enforced() {
    let manager = GroupManager::new(Quiet);
    let id = manager.register_group(addr(5000), [5; 16]).unwrap();

    for i in 0..MAX_CONNS_PER_GROUP {
        manager.register_connection(addr(6000 + i as u16), &id).unwrap();
    }

    assert_eq!(
        manager.register_connection(addr(7000), &id),
        Err(RegisterError::CapacityReached)
    );
    assert_eq!(manager.total_connections(), MAX_CONNS_PER_GROUP);
}

#[test]
fn reg2_for_an_unknown_group() {
    let manager = GroupManager::new(Quiet);
    let id = GroupId::from_wire(&[0xee; 32]).unwrap();

    assert_eq!(
        manager.register_connection(addr(5001), &id),
        Err(RegisterError::UnknownGroup)
    );
    assert_eq!(manager.len(), 0);
}

#[test]
fn reg2_cannot_move_an_address_across_groups() {
    let manager = GroupManager::new(Quiet);

    let a = manager.register_group(addr(5001), [1; 16]).unwrap();
    let b = manager.register_group(addr(5002), [2; 16]).unwrap();

    manager.register_connection(addr(5003), &a).unwrap();

    assert_eq!(
        manager.register_connection(addr(5003), &b),
        Err(RegisterError::GroupMismatch)
    );

    // The registering address of group A is equally locked to it.
    assert_eq!(
        manager.register_connection(addr(5001), &b),
        Err(RegisterError::GroupMismatch)
    );
}

#[test]
fn only_members_get_relay_service() {
    let manager = GroupManager::new(Quiet);
    let id = manager.register_group(addr(5001), [1; 16]).unwrap();

    // A complete stranger.
    assert!(!manager.touch(addr(4000)));
    assert!(manager.prepare_relay(addr(4000), Some(1)).is_none());

    // The REG1 address matches `last_addr` but holds no connection yet, so
    // it is still refused relay service.
    assert!(!manager.touch(addr(5001)));
    assert!(manager.prepare_relay(addr(5001), Some(1)).is_none());

    manager.register_connection(addr(5001), &id).unwrap();
    assert!(manager.touch(addr(5001)));
}

#[test]
fn ack_window_batches_ten_sequence_numbers() {
    let manager = GroupManager::new(Quiet);
    let id = manager.register_group(addr(5001), [1; 16]).unwrap();
    manager.register_connection(addr(5001), &id).unwrap();

    for sn in 100u32..109 {
        let relay = manager.prepare_relay(addr(5001), Some(sn)).unwrap();
        assert!(relay.ack.is_none());
    }

    // The tenth data packet flushes the window.
    let relay = manager.prepare_relay(addr(5001), Some(109)).unwrap();
    let ack = relay.ack.expect("window should flush on the tenth packet");

    assert_eq!(ack.len(), 44);
    assert_eq!(&ack[0..4], &[0x91, 0x00, 0x00, 0x00]);
    for (i, chunk) in ack[4..].chunks_exact(4).enumerate() {
        assert_eq!(chunk, &(100 + i as u32).to_be_bytes());
    }

    // The next packet starts a fresh window.
    let relay = manager.prepare_relay(addr(5001), Some(110)).unwrap();
    assert!(relay.ack.is_none());

    // Control packets carry no sequence number and never advance the
    // window.
    let relay = manager.prepare_relay(addr(5001), None).unwrap();
    assert!(relay.ack.is_none());
}

#[test]
fn last_addr_follows_the_most_recent_member() {
    let manager = GroupManager::new(Quiet);
    let id = manager.register_group(addr(5001), [1; 16]).unwrap();
    manager.register_connection(addr(5001), &id).unwrap();
    manager.register_connection(addr(5002), &id).unwrap();

    assert_eq!(manager.last_addr(&id), Some(addr(5002)));

    manager.prepare_relay(addr(5001), Some(1)).unwrap();
    assert_eq!(manager.last_addr(&id), Some(addr(5001)));
}

#[test]
fn sweep_evicts_idle_connections_and_abandoned_groups() {
    let events = Events::default();
    let log = events.0.clone();
    let manager = GroupManager::new(events);

    let id = manager.register_group(addr(5001), [1; 16]).unwrap();
    manager.register_connection(addr(5001), &id).unwrap();

    // Not yet past the timeout.
    manager.sweep(10);
    assert_eq!(manager.total_connections(), 1);

    manager.sweep(11);
    assert_eq!(manager.total_connections(), 0);
    assert_eq!(manager.len(), 0);

    let log = log.lock();
    assert_eq!(
        log.as_slice(),
        [format!("expired {}", addr(5001)), "closed TimedOut".to_string()]
    );
}

#[test]
fn sweep_never_evicts_a_group_with_live_connections() {
    let manager = GroupManager::new(Quiet);

    let id = manager.register_group(addr(5001), [1; 16]).unwrap();
    manager.register_connection(addr(5001), &id).unwrap();

    // A second link joins considerably later.
    for _ in 0..8 {
        manager.timer().add();
    }
    manager.register_connection(addr(5002), &id).unwrap();

    manager.sweep(11);
    assert_eq!(manager.total_connections(), 1);
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.member_addrs(&id), [addr(5002)]);
}

#[test]
fn groups_with_a_fresh_registration_survive_the_sweep() {
    let manager = GroupManager::new(Quiet);

    // Empty group, younger than the grace period: kept.
    manager.register_group(addr(5001), [1; 16]).unwrap();
    manager.sweep(9);
    assert_eq!(manager.len(), 1);

    manager.sweep(11);
    assert_eq!(manager.len(), 0);
}

#[tokio::test]
async fn upstream_socket_lifecycle() {
    let manager = GroupManager::new(Quiet);
    let id = manager.register_group(addr(5001), [1; 16]).unwrap();
    manager.register_connection(addr(5001), &id).unwrap();

    // No upstream socket until one is attached.
    let relay = manager.prepare_relay(addr(5001), None).unwrap();
    assert!(relay.upstream.is_none());

    let socket = Arc::new(tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let task = tokio::spawn(std::future::pending());
    assert!(manager.attach_upstream(&id, socket.clone(), task));

    let relay = manager.prepare_relay(addr(5001), None).unwrap();
    assert!(relay.upstream.is_some());

    assert!(manager.remove_group(&id));
    assert!(!manager.remove_group(&id));

    // Attaching to a removed group reports failure.
    let task = tokio::spawn(std::future::pending());
    assert!(!manager.attach_upstream(&id, socket, task));
}
