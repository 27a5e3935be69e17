use std::sync::Arc;

use mimalloc::MiMalloc;
use srtla_rec::config::Config;

// use mimalloc for global.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::load());
    simple_logger::init_with_level(log::Level::Info)?;

    srtla_rec::startup(config).await?;

    // The proxy runs on background tasks from here on; there is no
    // orderly shutdown beyond the process being killed.
    std::future::pending::<()>().await;
    unreachable!()
}
