pub mod probe;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::BytesMut;
use codec::MTU;
use service::Service;
use tokio::net::UdpSocket;

use crate::{
    config::Config,
    observer::Observer,
    statistics::{Statistics, Stats},
};

/// Size of the listening socket's kernel receive buffer. Several bonded
/// cellular links flushing at once arrive as one burst, so this is far
/// larger than any single flow would need.
const RECV_BUFFER_SIZE: usize = 32 * 1024 * 1024;

/// How often the running totals are written to the log.
const STATISTICS_PERIOD: Duration = Duration::from_secs(60);

/// Binds the SRTLA listening socket and starts the receive loop.
///
/// Returns the bound address; the loop itself runs on a spawned task for
/// as long as the process lives.
pub async fn run(
    config: &Config,
    statistics: &Statistics,
    service: &Arc<Service<Observer>>,
) -> anyhow::Result<SocketAddr> {
    let socket = Arc::new(listen_socket(config.listen_addr())?);
    let local_addr = socket.local_addr()?;

    tokio::spawn(listener(service.clone(), statistics.clone(), socket));
    tokio::spawn(report(statistics.clone(), service.clone()));

    log::info!("srtla_rec is now running: listen={local_addr}");
    Ok(local_addr)
}

/// One UDP socket with a large receive buffer, set up through socket2
/// because tokio does not expose the buffer size option.
fn listen_socket(addr: SocketAddr) -> anyhow::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM.nonblocking(),
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_recv_buffer_size(RECV_BUFFER_SIZE)?;
    socket.bind(&addr.into())?;

    // Convert from: socket2 -> std -> tokio
    Ok(UdpSocket::from_std(std::net::UdpSocket::from(socket))?)
}

/// The receive loop over the listening socket.
///
/// Datagrams from one peer are handled in arrival order; the session layer
/// takes care of everything past classification.
async fn listener(
    service: Arc<Service<Observer>>,
    statistics: Statistics,
    socket: Arc<UdpSocket>,
) {
    let mut buffer = BytesMut::zeroed(MTU);

    loop {
        let (size, addr) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                // Port-unreachable style errors surface here on some
                // platforms; they say nothing about the socket itself.
                log::warn!("srtla socket receive error: {e}");
                continue;
            }
        };

        statistics.add(Stats::ReceivedPkts(1));
        statistics.add(Stats::ReceivedBytes(size));
        log::trace!("srtla socket receive: size={size}, addr={addr}");

        Service::route(&service, &socket, &buffer[..size], addr).await;
    }
}

/// Periodically logs the running totals next to the current registry
/// occupancy.
async fn report(statistics: Statistics, service: Arc<Service<Observer>>) {
    let mut interval = tokio::time::interval(STATISTICS_PERIOD);
    interval.tick().await;

    loop {
        interval.tick().await;

        let counts = statistics.counts();
        log::debug!(
            "totals: groups={} connections={} received={} forwarded={} delivered={}",
            service.manager().len(),
            service.manager().total_connections(),
            counts.received_pkts.get(),
            counts.forwarded_pkts.get(),
            counts.delivered_pkts.get(),
        );
    }
}
