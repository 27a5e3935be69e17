use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, anyhow};
use codec::{MTU, srt};
use tokio::{
    net::{UdpSocket, lookup_host},
    time::timeout,
};

/// How long to wait for an induction response from each candidate.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Resolves the upstream SRT server and picks a reachable address.
///
/// SRT is connection oriented and will not answer arbitrary datagrams, so
/// each resolved candidate is probed with a real induction handshake. The
/// first candidate answering with a same-sized induction response wins.
/// When none answers, the first resolved address is used anyway with a
/// warning: the server may simply not be up yet, and groups re-handshake
/// on failure.
pub async fn resolve_srt_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let candidates: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .with_context(|| format!("failed to resolve the address {host}:{port}"))?
        .filter(|addr| addr.is_ipv4())
        .collect();

    let Some(first) = candidates.first().copied() else {
        return Err(anyhow!("no IPv4 address found for {host}:{port}"));
    };

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("failed to create a UDP socket")?;

    for addr in &candidates {
        log::info!("trying to connect to SRT at {addr}...");

        if probe(&socket, *addr).await {
            log::info!("SRT server confirmed at {addr}");
            return Ok(*addr);
        }

        log::info!("no SRT response from {addr}");
    }

    log::warn!(
        "failed to confirm that an SRT server is reachable at any address, proceeding with {first}"
    );
    Ok(first)
}

/// One induction round trip. A reply of the handshake's own size means a
/// live SRT listener.
async fn probe(socket: &UdpSocket, addr: SocketAddr) -> bool {
    if socket.connect(addr).await.is_err() {
        return false;
    }

    let request = srt::induction_request();
    if !matches!(socket.send(&request).await, Ok(n) if n == request.len()) {
        return false;
    }

    let mut buf = [0u8; MTU];
    matches!(
        timeout(PROBE_TIMEOUT, socket.recv(&mut buf)).await,
        Ok(Ok(n)) if n == request.len()
    )
}
