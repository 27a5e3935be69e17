use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, sleep},
    time::Duration,
};

use codec::{ACK_WINDOW, SRTLA_ID_LEN, SRTLA_TYPE_ACK_LEN};
use parking_lot::RwLock;
use rand::{RngCore, rngs::OsRng};
use subtle::ConstantTimeEq;
use tokio::{net::UdpSocket, task::JoinHandle};

use crate::{CloseReason, RegisterError, ServiceHandler};

/// Process-wide cap on simultaneously registered groups.
pub const MAX_GROUPS: usize = 200;

/// Cap on member links per group.
pub const MAX_CONNS_PER_GROUP: usize = 16;

/// Seconds of silence after which a member connection is evicted.
pub const CONN_TIMEOUT: u64 = 10;

/// Minimum age in seconds before an empty group is evicted.
pub const GROUP_TIMEOUT: u64 = 10;

/// Seconds between reaper sweeps.
pub const CLEANUP_PERIOD: u64 = 3;

/// A 256-bit group identifier.
///
/// The first half is chosen by the client in REG1; the second half is drawn
/// from the operating system's randomness source when the group is created,
/// and is the only secret tying a sender to its group. Comparison is
/// constant-time so lookups cannot leak how much of an identifier a probe
/// got right.
#[derive(Clone)]
pub struct GroupId([u8; SRTLA_ID_LEN]);

impl GroupId {
    fn generate(client_half: [u8; SRTLA_ID_LEN / 2]) -> Self {
        let mut id = [0u8; SRTLA_ID_LEN];
        id[..SRTLA_ID_LEN / 2].copy_from_slice(&client_half);
        OsRng.fill_bytes(&mut id[SRTLA_ID_LEN / 2..]);
        Self(id)
    }

    /// Reads an identifier from its wire representation.
    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        Some(Self(bytes.try_into().ok()?))
    }

    pub fn as_bytes(&self) -> &[u8; SRTLA_ID_LEN] {
        &self.0
    }
}

impl PartialEq for GroupId {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for GroupId {}

impl fmt::Display for GroupId {
    /// Prints the leading bytes of the client half. Enough to correlate
    /// log lines, and never the server-generated secret half.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({self})")
    }
}

/// One member link of a group: a single peer 5-tuple.
pub struct Connection {
    pub addr: SocketAddr,
    // Sequence numbers are logged in network byte order so a filled window
    // is copied straight into the ACK body.
    recv_log: [u8; 4 * ACK_WINDOW],
    recv_idx: usize,
    last_rcvd: u64,
}

impl Connection {
    fn new(addr: SocketAddr, now: u64) -> Self {
        Self {
            addr,
            recv_log: [0; 4 * ACK_WINDOW],
            recv_idx: 0,
            last_rcvd: now,
        }
    }

    /// Logs one observed data sequence number. Returns the encoded SRTLA
    /// ACK when this packet filled the window, which also starts the next
    /// window.
    fn record(&mut self, sn: u32) -> Option<[u8; SRTLA_TYPE_ACK_LEN]> {
        self.recv_log[self.recv_idx * 4..self.recv_idx * 4 + 4].copy_from_slice(&sn.to_be_bytes());
        self.recv_idx += 1;

        if self.recv_idx == ACK_WINDOW {
            self.recv_idx = 0;
            Some(codec::ack(&self.recv_log))
        } else {
            None
        }
    }
}

/// The lazily opened socket toward the SRT server, together with the task
/// that drains it. Dropping the group cancels the task with it.
struct Upstream {
    socket: Arc<UdpSocket>,
    task: JoinHandle<()>,
}

impl Drop for Upstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One aggregated session: the member links of a single sender plus the
/// group's upstream socket.
struct Group {
    id: GroupId,
    conns: Vec<Connection>,
    // The most recent peer to have sent a valid packet for this group.
    // Right after REG1 it holds the registering address, which blocks that
    // sender from opening a second group while this one is alive.
    last_addr: SocketAddr,
    created_at: u64,
    upstream: Option<Upstream>,
}

/// A specially optimised timer.
///
/// This timer does not stack automatically and needs to be stacked
/// externally and manually.
///
/// ```
/// use srtla_rec_service::groups::Timer;
///
/// let timer = Timer::default();
///
/// assert_eq!(timer.get(), 0);
/// assert_eq!(timer.add(), 1);
/// assert_eq!(timer.get(), 1);
/// ```
#[derive(Default)]
pub struct Timer(AtomicU64);

impl Timer {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn add(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Everything a relayable datagram needs after the registry bookkeeping is
/// done: the owning group, the batched acknowledgement when the window just
/// filled, and the upstream socket when one is already open.
pub struct Relay {
    pub group: GroupId,
    pub ack: Option<[u8; SRTLA_TYPE_ACK_LEN]>,
    pub upstream: Option<Arc<UdpSocket>>,
}

/// The registry of active groups.
///
/// A group is retrievable three ways and the lookups always agree: by
/// identifier, by any member address, and by its `last_addr`. Member
/// matches win over `last_addr` matches. At the configured caps linear
/// scans are cheaper than maintaining indexes.
pub struct GroupManager<T> {
    groups: RwLock<Vec<Group>>,
    timer: Timer,
    handler: T,
}

impl<T: ServiceHandler> GroupManager<T> {
    pub fn new(handler: T) -> Arc<Self> {
        let this = Arc::new(Self {
            groups: RwLock::new(Vec::with_capacity(MAX_GROUPS)),
            timer: Timer::default(),
            handler,
        });

        // This is a background thread that advances the coarse clock once
        // a second and periodically sweeps out idle connections and
        // abandoned groups.
        let this_ = Arc::downgrade(&this);
        thread::spawn(move || {
            while let Some(this) = this_.upgrade() {
                let now = this.timer.add();
                if now % CLEANUP_PERIOD == 0 {
                    this.sweep(now);
                }

                drop(this);
                sleep(Duration::from_secs(1));
            }
        });

        this
    }

    pub fn handler(&self) -> &T {
        &self.handler
    }

    /// The coarse clock, in seconds since startup. Advanced by the reaper
    /// thread.
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }

    pub fn total_connections(&self) -> usize {
        self.groups.read().iter().map(|g| g.conns.len()).sum()
    }

    /// Handles REG1: creates a group keyed by the completed identifier.
    ///
    /// Refused when the registry is full or when the source address is
    /// already tied to a group; a sender with an active group cannot start
    /// another one.
    pub fn register_group(
        &self,
        src: SocketAddr,
        client_half: [u8; SRTLA_ID_LEN / 2],
    ) -> Result<GroupId, RegisterError> {
        let mut groups = self.groups.write();

        if groups.len() >= MAX_GROUPS {
            return Err(RegisterError::CapacityReached);
        }

        if find_by_addr(&groups, src).is_some() {
            return Err(RegisterError::AddressInUse);
        }

        let id = GroupId::generate(client_half);
        groups.push(Group {
            id: id.clone(),
            conns: Vec::new(),
            last_addr: src,
            created_at: self.timer.get(),
            upstream: None,
        });

        Ok(id)
    }

    /// Handles REG2: adds the source address as a member of the identified
    /// group.
    ///
    /// Registering an address that is already a member of the same group
    /// succeeds idempotently (`Ok(true)`), so a sender whose REG3 was lost
    /// can simply retransmit.
    pub fn register_connection(
        &self,
        src: SocketAddr,
        id: &GroupId,
    ) -> Result<bool, RegisterError> {
        let mut groups = self.groups.write();

        let Some(target) = position_by_id(&groups, id) else {
            return Err(RegisterError::UnknownGroup);
        };

        if let Some((owner, _)) = find_by_addr(&groups, src) {
            if owner != target {
                return Err(RegisterError::GroupMismatch);
            }
        }

        let group = &mut groups[target];
        let renewed = group.conns.iter().any(|conn| conn.addr == src);

        if !renewed {
            if group.conns.len() >= MAX_CONNS_PER_GROUP {
                return Err(RegisterError::CapacityReached);
            }

            let now = self.timer.get();
            group.conns.push(Connection::new(src, now));
        }

        // The registering peer becomes the most recently active one.
        group.last_addr = src;

        Ok(renewed)
    }

    /// Refreshes the activity timestamp of the member connection owning
    /// `src`. Returns false for non-members, including addresses that only
    /// match a group's `last_addr`; those get no relay service.
    pub fn touch(&self, src: SocketAddr) -> bool {
        let mut groups = self.groups.write();

        if let Some((gi, Some(ci))) = find_by_addr(&groups, src) {
            groups[gi].conns[ci].last_rcvd = self.timer.get();
            true
        } else {
            false
        }
    }

    /// Registry bookkeeping for one relayable datagram from a member:
    /// marks the member as the group's most recently active address and,
    /// for data packets, logs the sequence number into the member's
    /// acknowledgement window.
    pub fn prepare_relay(&self, src: SocketAddr, sn: Option<u32>) -> Option<Relay> {
        let mut groups = self.groups.write();

        let (gi, ci) = match find_by_addr(&groups, src) {
            Some((gi, Some(ci))) => (gi, ci),
            _ => return None,
        };

        let group = &mut groups[gi];
        group.last_addr = src;

        Some(Relay {
            group: group.id.clone(),
            ack: sn.and_then(|sn| group.conns[ci].record(sn)),
            upstream: group.upstream.as_ref().map(|up| up.socket.clone()),
        })
    }

    /// Hands the freshly opened upstream socket and its drain task to the
    /// owning group. Returns false (and cancels the task) when the group
    /// disappeared while the socket was being opened.
    pub fn attach_upstream(
        &self,
        id: &GroupId,
        socket: Arc<UdpSocket>,
        task: JoinHandle<()>,
    ) -> bool {
        let mut groups = self.groups.write();

        match position_by_id(&groups, id) {
            Some(index) => {
                groups[index].upstream = Some(Upstream { socket, task });
                true
            }
            None => {
                task.abort();
                false
            }
        }
    }

    /// Member addresses for an SRT ACK broadcast.
    pub fn member_addrs(&self, id: &GroupId) -> Vec<SocketAddr> {
        let groups = self.groups.read();

        match position_by_id(&groups, id) {
            Some(index) => groups[index].conns.iter().map(|conn| conn.addr).collect(),
            None => Vec::new(),
        }
    }

    /// The most recently active member address, the destination for all
    /// non-ACK upstream traffic.
    pub fn last_addr(&self, id: &GroupId) -> Option<SocketAddr> {
        let groups = self.groups.read();
        position_by_id(&groups, id).map(|index| groups[index].last_addr)
    }

    /// Removes a group and releases its resources, cancelling the upstream
    /// drain task with it.
    pub fn remove_group(&self, id: &GroupId) -> bool {
        let mut groups = self.groups.write();

        match position_by_id(&groups, id) {
            Some(index) => {
                groups.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// One reaper pass: evicts member connections idle past CONN_TIMEOUT,
    /// then groups that are both empty and older than GROUP_TIMEOUT. A
    /// group with any live connection is never evicted.
    pub fn sweep(&self, now: u64) {
        let mut expired = Vec::new();
        let mut closed = Vec::new();

        {
            let groups = self.groups.read();
            if groups.is_empty() {
                return;
            }
        }

        log::debug!("starting a cleanup run");

        let (total_groups, total_conns) = {
            let mut groups = self.groups.write();
            let total_groups = groups.len();
            let total_conns = groups.iter().map(|g| g.conns.len()).sum::<usize>();

            for group in groups.iter_mut() {
                group.conns.retain(|conn| {
                    if conn.last_rcvd + CONN_TIMEOUT < now {
                        expired.push((conn.addr, group.id.clone()));
                        false
                    } else {
                        true
                    }
                });
            }

            groups.retain(|group| {
                if group.conns.is_empty() && group.created_at + GROUP_TIMEOUT < now {
                    closed.push(group.id.clone());
                    false
                } else {
                    true
                }
            });

            (total_groups, total_conns)
        };

        for (addr, id) in &expired {
            self.handler.on_connection_expired(*addr, id);
        }

        for id in &closed {
            self.handler.on_group_closed(id, CloseReason::TimedOut);
        }

        log::debug!(
            "cleanup run ended: counted {} groups and {} connections, removed {} groups and {} connections",
            total_groups,
            total_conns,
            closed.len(),
            expired.len()
        );
    }
}

fn position_by_id(groups: &[Group], id: &GroupId) -> Option<usize> {
    groups.iter().position(|group| &group.id == id)
}

/// The address lookup backing both registration checks and the data plane:
/// first an exact member match across every group, then the groups'
/// `last_addr` records. The second component is the member connection
/// index when the address is an actual member.
fn find_by_addr(groups: &[Group], addr: SocketAddr) -> Option<(usize, Option<usize>)> {
    for (gi, group) in groups.iter().enumerate() {
        if let Some(ci) = group.conns.iter().position(|conn| conn.addr == addr) {
            return Some((gi, Some(ci)));
        }
    }

    groups
        .iter()
        .position(|group| group.last_addr == addr)
        .map(|gi| (gi, None))
}
