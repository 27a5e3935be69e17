use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// The type of information passed to the statistics instance.
#[derive(Debug, Clone, Copy)]
pub enum Stats {
    ReceivedBytes(usize),
    ReceivedPkts(usize),
    ForwardedBytes(usize),
    ForwardedPkts(usize),
    DeliveredBytes(usize),
    DeliveredPkts(usize),
    GroupsRegistered(usize),
    GroupsClosed(usize),
    ConnectionsRegistered(usize),
    ConnectionsExpired(usize),
    RejectedPkts(usize),
}

#[derive(Default)]
pub struct Count(AtomicUsize);

impl Count {
    pub fn add(&self, value: usize) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Running totals for the whole process.
///
/// "Forwarded" counts sender-to-SRT traffic, "delivered" the opposite
/// direction.
#[derive(Default)]
pub struct Counts {
    pub received_bytes: Count,
    pub received_pkts: Count,
    pub forwarded_bytes: Count,
    pub forwarded_pkts: Count,
    pub delivered_bytes: Count,
    pub delivered_pkts: Count,
    pub groups_registered: Count,
    pub groups_closed: Count,
    pub connections_registered: Count,
    pub connections_expired: Count,
    pub rejected_pkts: Count,
}

/// Cheap cloneable handle to the process counters.
///
/// # Example
///
/// ```
/// use srtla_rec::statistics::{Statistics, Stats};
///
/// let statistics = Statistics::default();
///
/// statistics.add(Stats::ReceivedBytes(1316));
/// statistics.add(Stats::ReceivedPkts(1));
///
/// assert_eq!(statistics.counts().received_bytes.get(), 1316);
/// assert_eq!(statistics.counts().received_pkts.get(), 1);
/// ```
#[derive(Default, Clone)]
pub struct Statistics(Arc<Counts>);

impl Statistics {
    pub fn add(&self, payload: Stats) {
        match payload {
            Stats::ReceivedBytes(v) => self.0.received_bytes.add(v),
            Stats::ReceivedPkts(v) => self.0.received_pkts.add(v),
            Stats::ForwardedBytes(v) => self.0.forwarded_bytes.add(v),
            Stats::ForwardedPkts(v) => self.0.forwarded_pkts.add(v),
            Stats::DeliveredBytes(v) => self.0.delivered_bytes.add(v),
            Stats::DeliveredPkts(v) => self.0.delivered_pkts.add(v),
            Stats::GroupsRegistered(v) => self.0.groups_registered.add(v),
            Stats::GroupsClosed(v) => self.0.groups_closed.add(v),
            Stats::ConnectionsRegistered(v) => self.0.connections_registered.add(v),
            Stats::ConnectionsExpired(v) => self.0.connections_expired.add(v),
            Stats::RejectedPkts(v) => self.0.rejected_pkts.add(v),
        }
    }

    pub fn counts(&self) -> &Counts {
        &self.0
    }
}
