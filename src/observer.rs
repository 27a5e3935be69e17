use std::net::SocketAddr;

use service::{CloseReason, RegisterError, ServiceHandler, groups::GroupId};

use crate::statistics::{Statistics, Stats};

/// Turns session layer events into log lines and statistics.
#[derive(Clone)]
pub struct Observer {
    statistics: Statistics,
}

impl Observer {
    pub fn new(statistics: Statistics) -> Self {
        Self { statistics }
    }
}

impl ServiceHandler for Observer {
    fn on_group_registered(&self, addr: SocketAddr, id: &GroupId) {
        log::info!("{addr}: group {id} registered");
        self.statistics.add(Stats::GroupsRegistered(1));
    }

    fn on_registration_failed(&self, addr: SocketAddr, error: RegisterError) {
        log::error!("{addr}: registration failed: {error}");
        self.statistics.add(Stats::RejectedPkts(1));
    }

    fn on_connection_registered(&self, addr: SocketAddr, id: &GroupId, renewed: bool) {
        if renewed {
            log::info!("{addr} (group {id}): connection registration renewed");
        } else {
            log::info!("{addr} (group {id}): connection registered");
            self.statistics.add(Stats::ConnectionsRegistered(1));
        }
    }

    fn on_connection_expired(&self, addr: SocketAddr, id: &GroupId) {
        log::info!("{addr} (group {id}): connection removed (timed out)");
        self.statistics.add(Stats::ConnectionsExpired(1));
    }

    fn on_group_closed(&self, id: &GroupId, reason: CloseReason) {
        match reason {
            CloseReason::TimedOut => log::info!("group {id} removed (no connections)"),
            CloseReason::UpstreamError => log::info!("group {id} removed (upstream error)"),
        }

        self.statistics.add(Stats::GroupsClosed(1));
    }

    fn on_upstream_opened(&self, id: &GroupId, peer: SocketAddr) {
        log::info!("group {id}: connected to the SRT server at {peer}");
    }

    fn on_forwarded(&self, _id: &GroupId, bytes: usize) {
        self.statistics.add(Stats::ForwardedPkts(1));
        self.statistics.add(Stats::ForwardedBytes(bytes));
    }

    fn on_delivered(&self, _addr: SocketAddr, bytes: usize) {
        self.statistics.add(Stats::DeliveredPkts(1));
        self.statistics.add(Stats::DeliveredBytes(bytes));
    }
}
