//! Metrics initialization for Prometheus exporter.
//!
//! Exposed metrics:
//!
//! - `hosts_refresh_total{outcome}`: refresh cycles by outcome, one of
//!   `unchanged`, `committed` or `failed`
//! - `hosts_addresses`: addresses in the committed hosts table
//! - `hosts_rules`: rules in the committed engine

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::container::{RefreshError, RefreshOutcome};
use crate::error::Result;

/// Initialize the metrics system based on configuration.
///
/// When metrics are enabled, this starts an HTTP server that exposes
/// a `/metrics` endpoint for Prometheus to scrape.
///
/// When metrics are disabled, this is a no-op. The `metrics` crate
/// handles unregistered metrics gracefully (they become no-ops).
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(|err| crate::error::Error::Metrics(err.to_string()))?;

    Ok(())
}

pub(crate) fn record_refresh(res: &std::result::Result<RefreshOutcome, RefreshError>) {
    let outcome = match res {
        Ok(RefreshOutcome::Unchanged) => "unchanged",
        Ok(RefreshOutcome::Committed { .. }) => "committed",
        Err(_) => "failed",
    };

    metrics::counter!("hosts_refresh_total", "outcome" => outcome).increment(1);
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn record_tables(addresses: usize, rules: usize) {
    metrics::gauge!("hosts_addresses").set(addresses as f64);
    metrics::gauge!("hosts_rules").set(rules as f64);
}
