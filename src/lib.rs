pub mod config;
pub mod observer;
pub mod server;
pub mod statistics;

use std::{net::SocketAddr, sync::Arc};

use service::{Service, ServiceOptions};

use self::{config::Config, observer::Observer, statistics::Statistics};

#[rustfmt::skip]
pub static SOFTWARE: &str = concat!(
    "srtla_rec.",
    env!("CARGO_PKG_VERSION")
);

/// Probes the upstream SRT server and starts the proxy.
///
/// Opened as a function (instead of living in `main`) so integration tests
/// can start a complete server in-process; the returned address is the
/// bound SRTLA listening socket.
pub async fn startup(config: Arc<Config>) -> anyhow::Result<SocketAddr> {
    let upstream = server::probe::resolve_srt_addr(&config.srt_host, config.srt_port).await?;

    let statistics = Statistics::default();
    let service = Service::new(ServiceOptions {
        handler: Observer::new(statistics.clone()),
        upstream,
    });

    server::run(&config, &statistics, &service).await
}
