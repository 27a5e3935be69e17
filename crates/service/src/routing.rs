use std::{net::SocketAddr, sync::Arc};

use codec::{MTU, PacketKind, srt};
use tokio::net::UdpSocket;

use crate::{
    CloseReason, RegisterError, Service, ServiceHandler,
    groups::{GroupId, GroupManager},
};

/// Dispatches one datagram from the listening socket.
///
/// Registration packets run the handshake; everything else is relay
/// traffic and only members get service. Malformed or undersized
/// datagrams are dropped without touching any state.
pub(crate) async fn route<T: ServiceHandler>(
    service: &Arc<Service<T>>,
    listener: &Arc<UdpSocket>,
    bytes: &[u8],
    src: SocketAddr,
) {
    match codec::classify(bytes) {
        Some(PacketKind::Reg1) => register_group(service, listener, bytes, src).await,
        Some(PacketKind::Reg2) => register_connection(service, listener, bytes, src).await,
        kind => relay(service, listener, bytes, src, kind == Some(PacketKind::Keepalive)).await,
    }
}

/// REG1: completes the group identifier and answers REG2, or refuses with
/// REG_ERR when the caps or the address rules say no.
async fn register_group<T: ServiceHandler>(
    service: &Arc<Service<T>>,
    listener: &Arc<UdpSocket>,
    bytes: &[u8],
    src: SocketAddr,
) {
    let manager = service.manager();
    let Some(client_half) = codec::reg1_client_id(bytes).and_then(|id| id.try_into().ok()) else {
        return;
    };

    match manager.register_group(src, client_half) {
        Ok(id) => {
            send_reply(listener, &codec::reg2(id.as_bytes()), src, "REG2").await;
            manager.handler().on_group_registered(src, &id);
        }
        Err(error) => {
            send_reply(listener, &codec::reg_err(), src, "REG_ERR").await;
            manager.handler().on_registration_failed(src, error);
        }
    }
}

/// REG2: joins the source address to the identified group and answers
/// REG3. An unknown identifier gets REG_NGP, every other refusal REG_ERR.
async fn register_connection<T: ServiceHandler>(
    service: &Arc<Service<T>>,
    listener: &Arc<UdpSocket>,
    bytes: &[u8],
    src: SocketAddr,
) {
    let manager = service.manager();
    let Some(id) = codec::reg2_group_id(bytes).and_then(GroupId::from_wire) else {
        return;
    };

    match manager.register_connection(src, &id) {
        Ok(renewed) => {
            send_reply(listener, &codec::reg3(), src, "REG3").await;
            manager.handler().on_connection_registered(src, &id, renewed);
        }
        Err(error) => {
            let reply = match error {
                RegisterError::UnknownGroup => codec::reg_ngp(),
                _ => codec::reg_err(),
            };

            send_reply(listener, &reply, src, "registration refusal").await;
            manager.handler().on_registration_failed(src, error);
        }
    }
}

/// The member data plane: keep-alive echo, acknowledgement batching and
/// the forward to the group's upstream socket.
async fn relay<T: ServiceHandler>(
    service: &Arc<Service<T>>,
    listener: &Arc<UdpSocket>,
    bytes: &[u8],
    src: SocketAddr,
    keepalive: bool,
) {
    let manager = service.manager();

    // Non-members are dropped before anything else is looked at.
    if !manager.touch(src) {
        return;
    }

    if keepalive {
        send_reply(listener, bytes, src, "keepalive echo").await;
        return;
    }

    if bytes.len() < srt::SRT_MIN_LEN {
        return;
    }

    let Some(relay) = manager.prepare_relay(src, srt::sequence_number(bytes)) else {
        return;
    };

    if let Some(ack) = relay.ack {
        send_reply(listener, &ack, src, "srtla ack").await;
    }

    let socket = match relay.upstream {
        Some(socket) => socket,
        None => match open_upstream(service, listener, &relay.group).await {
            Some(socket) => socket,
            None => return,
        },
    };

    match socket.send(bytes).await {
        Ok(n) if n == bytes.len() => manager.handler().on_forwarded(&relay.group, n),
        result => {
            log::error!(
                "group {}: failed to forward to the SRT server ({result:?}), terminating the group",
                relay.group
            );
            close_group(manager, &relay.group);
        }
    }
}

/// Opens the group's connected upstream socket on its first forwardable
/// packet and spawns the task draining the return direction. Any failure
/// here tears the group down; the sender will re-handshake.
async fn open_upstream<T: ServiceHandler>(
    service: &Arc<Service<T>>,
    listener: &Arc<UdpSocket>,
    id: &GroupId,
) -> Option<Arc<UdpSocket>> {
    let manager = service.manager();
    let peer = service.upstream();

    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(e) => {
            log::error!("group {id}: failed to create an SRT socket: {e}");
            close_group(manager, id);
            return None;
        }
    };

    if let Err(e) = socket.connect(peer).await {
        log::error!("group {id}: failed to connect the SRT socket to {peer}: {e}");
        close_group(manager, id);
        return None;
    }

    let socket = Arc::new(socket);
    let task = tokio::spawn(upstream_loop(
        service.clone(),
        listener.clone(),
        socket.clone(),
        id.clone(),
    ));

    if !manager.attach_upstream(id, socket.clone(), task) {
        // The reaper won the race; nothing to undo, attach cancelled the
        // task already.
        return None;
    }

    manager.handler().on_upstream_opened(id, peer);
    Some(socket)
}

/// Drains one group's upstream socket for as long as the group lives.
///
/// SRT full ACKs are fanned out to every member link so the sender learns
/// about delivery even when individual paths are lossy; everything else
/// follows the most recently active member. Per-packet send failures are
/// logged and skipped, an unhealthy upstream read tears the group down.
async fn upstream_loop<T: ServiceHandler>(
    service: Arc<Service<T>>,
    listener: Arc<UdpSocket>,
    socket: Arc<UdpSocket>,
    id: GroupId,
) {
    let manager = service.manager();
    let mut buf = [0u8; MTU];

    loop {
        let n = match socket.recv(&mut buf).await {
            Ok(n) if n >= srt::SRT_MIN_LEN => n,
            result => {
                log::error!(
                    "group {id}: failed to read the SRT socket ({result:?}), terminating the group"
                );
                close_group(manager, &id);
                return;
            }
        };

        let bytes = &buf[..n];

        if srt::is_ack(bytes) {
            for addr in manager.member_addrs(&id) {
                match listener.send_to(bytes, addr).await {
                    Ok(sent) if sent == n => manager.handler().on_delivered(addr, n),
                    result => {
                        log::warn!("group {id}: failed to send the SRT ack to {addr}: {result:?}")
                    }
                }
            }
        } else {
            let Some(addr) = manager.last_addr(&id) else {
                return;
            };

            match listener.send_to(bytes, addr).await {
                Ok(sent) if sent == n => manager.handler().on_delivered(addr, n),
                result => {
                    log::warn!("group {id}: failed to send the SRT packet to {addr}: {result:?}")
                }
            }
        }
    }
}

fn close_group<T: ServiceHandler>(manager: &GroupManager<T>, id: &GroupId) {
    if manager.remove_group(id) {
        manager.handler().on_group_closed(id, CloseReason::UpstreamError);
    }
}

/// Replies and echoes share one failure mode: a transient socket error
/// drops the packet, is logged, and never touches registry state.
async fn send_reply(listener: &UdpSocket, bytes: &[u8], dst: SocketAddr, what: &str) {
    if let Err(e) = listener.send_to(bytes, dst).await {
        log::warn!("failed to send the {what} to {dst}: {e}");
    }
}
