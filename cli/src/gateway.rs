// Gateway loop — poll the fleet, relay the batch, cache on failure

use crate::config::Config;
use anyhow::{Context, Result};
use fleetlink_core::fleet::{FleetPoller, Radio};
use fleetlink_core::relay::RelayClient;
use fleetlink_core::store::OfflineCache;
use fleetlink_core::tls;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

pub async fn run(config: Config, radio: Box<dyn Radio>) -> Result<()> {
    anyhow::ensure!(
        !config.fleet.is_empty(),
        "the fleet schema is empty; nothing to poll"
    );

    let gateway = &config.gateway;

    let cache_path = gateway.resolve_cache_path()?;
    let (cache, report) = OfflineCache::open(&cache_path)
        .await
        .with_context(|| format!("opening offline cache {}", cache_path.display()))?;
    if report.dropped > 0 {
        warn!(
            dropped = report.dropped,
            kept = report.kept,
            cache = %cache_path.display(),
            "corrupt cache entries dropped on open, those measurements are lost"
        );
    }
    let cache = Arc::new(cache);

    let client_tls = tls::client_config(gateway.root_ca.as_deref())
        .context("loading TLS trust material")?;
    let relay = RelayClient::new(gateway.relay_config(), client_tls, Arc::clone(&cache))
        .with_context(|| format!("invalid relay host {:?}", gateway.relay_host))?;

    let poller = FleetPoller::new(radio, config.fleet.clone(), gateway.poller_config());

    info!(
        devices = config.fleet.devices.len(),
        endpoint = format!("{}:{}", gateway.relay_host, gateway.relay_port),
        cache = %cache_path.display(),
        "gateway started"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(gateway.poll_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match poller.poll_cycle().await {
            Ok(batch) => {
                if !relay.send_batch(&batch).await {
                    info!("delivery failed, batch cached for a later cycle");
                }
            }
            Err(e) => warn!("poll cycle abandoned: {e}"),
        }
    }
}
