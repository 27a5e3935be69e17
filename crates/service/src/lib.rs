pub mod groups;

mod routing;

use std::{fmt, net::SocketAddr, sync::Arc};

use tokio::net::UdpSocket;

use self::groups::{GroupId, GroupManager};

/// Why a registration attempt was refused.
///
/// Rejections are reported on the wire (REG_ERR or REG_NGP) and leave the
/// registry untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// The registry or the group is at its capacity limit.
    CapacityReached,
    /// The source address already belongs to an active group.
    AddressInUse,
    /// No group matches the identifier presented in REG2.
    UnknownGroup,
    /// The source address is a member of a different group than the one
    /// its REG2 names.
    GroupMismatch,
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CapacityReached => "capacity reached",
            Self::AddressInUse => "remote address already registered to a group",
            Self::UnknownGroup => "no group found",
            Self::GroupMismatch => "provided group id mismatch",
        })
    }
}

/// Why a group was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// All member connections timed out and the group aged past its grace
    /// period.
    TimedOut,
    /// The upstream SRT socket failed; the sender is expected to
    /// re-handshake.
    UpstreamError,
}

/// Hooks into the lifecycle of groups and member connections.
///
/// Every hook has an empty default implementation so integrations only
/// observe what they care about. Hooks are invoked from the packet path and
/// from the reaper thread; they must not block.
pub trait ServiceHandler: Send + Sync + 'static {
    /// A REG1 exchange completed and a new group exists.
    #[allow(unused_variables)]
    fn on_group_registered(&self, addr: SocketAddr, id: &GroupId) {}

    /// A REG1 or REG2 was refused.
    #[allow(unused_variables)]
    fn on_registration_failed(&self, addr: SocketAddr, error: RegisterError) {}

    /// A REG2/REG3 exchange completed for a member link. `renewed` is set
    /// when the address was already a member and the registration was
    /// answered idempotently.
    #[allow(unused_variables)]
    fn on_connection_registered(&self, addr: SocketAddr, id: &GroupId, renewed: bool) {}

    /// The reaper evicted an idle member connection.
    #[allow(unused_variables)]
    fn on_connection_expired(&self, addr: SocketAddr, id: &GroupId) {}

    /// The group was removed, either by the reaper or after a fatal
    /// upstream socket error.
    #[allow(unused_variables)]
    fn on_group_closed(&self, id: &GroupId, reason: CloseReason) {}

    /// The group's connected upstream socket was opened lazily on its
    /// first forwardable SRT packet.
    #[allow(unused_variables)]
    fn on_upstream_opened(&self, id: &GroupId, peer: SocketAddr) {}

    /// A datagram was forwarded to the upstream SRT server.
    #[allow(unused_variables)]
    fn on_forwarded(&self, id: &GroupId, bytes: usize) {}

    /// A datagram from the upstream SRT server was delivered to a member
    /// address.
    #[allow(unused_variables)]
    fn on_delivered(&self, addr: SocketAddr, bytes: usize) {}
}

pub struct ServiceOptions<T> {
    /// The resolved upstream SRT server address shared by every group.
    pub upstream: SocketAddr,
    pub handler: T,
}

/// The SRTLA session layer.
///
/// Owns the group registry and implements the bidirectional relay: SRTLA
/// registration and keep-alives on the listening socket, datagram
/// forwarding to per-group upstream sockets, and SRT ACK fan-out back over
/// the member links.
pub struct Service<T> {
    manager: Arc<GroupManager<T>>,
    upstream: SocketAddr,
}

impl<T: ServiceHandler> Service<T> {
    pub fn new(options: ServiceOptions<T>) -> Arc<Self> {
        Arc::new(Self {
            manager: GroupManager::new(options.handler),
            upstream: options.upstream,
        })
    }

    pub fn manager(&self) -> &Arc<GroupManager<T>> {
        &self.manager
    }

    /// The upstream SRT server address every group connects to.
    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    /// Processes one datagram received on the listening socket.
    ///
    /// `listener` is the socket the datagram arrived on; all replies to the
    /// sender leave through it so the peer keeps talking to a single
    /// 5-tuple. Takes the service by `Arc` because the first forwardable
    /// packet of a group spawns the task draining its upstream socket.
    pub async fn route(
        service: &Arc<Self>,
        listener: &Arc<UdpSocket>,
        bytes: &[u8],
        src: SocketAddr,
    ) {
        routing::route(service, listener, bytes, src).await
    }
}
