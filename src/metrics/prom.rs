use lazy_static::lazy_static;
use prometheus::{labels, register_gauge, Gauge};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::ProbeResult;

lazy_static! {
    static ref NETCHECK_PROBE_SUCCESS: Gauge =
        register_gauge!("netcheck_probe_success", "1 if the last probe succeeded").unwrap();
    static ref NETCHECK_PROBE_DURATION_SECONDS: Gauge = register_gauge!(
        "netcheck_probe_duration_seconds",
        "wall time of the last probe exchange"
    )
    .unwrap();
    static ref NETCHECK_PEER_CERTIFICATES: Gauge = register_gauge!(
        "netcheck_peer_certificates",
        "certificates presented by the peer"
    )
    .unwrap();
}

/// Grouping labels attached to a pushed probe.
///
/// Labels without a value are left out: the gateway encodes the grouping key
/// in the URL path.
pub fn probe_labels(result: &ProbeResult, mode: &str) -> HashMap<String, String> {
    let mut grouping = labels! {
        "instance".to_owned() => "netcheck".to_owned(),
        "host".to_owned() => result.host().to_owned(),
        "port".to_owned() => result.port().to_string(),
        "mode".to_owned() => mode.to_owned(),
    };
    match (result.handshake(), result.failure()) {
        (Some(handshake), _) => {
            grouping.insert("version".to_owned(), handshake.version.to_string());
            grouping.insert("cipher".to_owned(), handshake.cipher_suite.to_string());
            grouping.insert("stage".to_owned(), "established".to_owned());
        }
        (None, Some(err)) => {
            grouping.insert("stage".to_owned(), err.stage().to_owned());
        }
        (None, None) => {}
    }
    grouping
}

/// Function to push probe metrics to prometheus
/// # Arguments
/// * `result` - Finished probe
/// * `mode` - Mode name the probe ran under
/// * `prometheus_address` - Push gateway base address; the client appends
///   `/metrics/job/netcheck` and the grouping labels itself
pub fn prometheus_metrics(result: &ProbeResult, mode: &str, prometheus_address: &str) {
    NETCHECK_PROBE_SUCCESS.set(if result.success() { 1.0 } else { 0.0 });
    NETCHECK_PROBE_DURATION_SECONDS.set(result.elapsed().as_secs_f64());
    NETCHECK_PEER_CERTIFICATES.set(
        result
            .handshake()
            .map(|h| h.peer_certificates as f64)
            .unwrap_or(0.0),
    );

    let metric_families = prometheus::gather();
    let url = prometheus_address.trim_end_matches('/');
    match prometheus::push_metrics(
        "netcheck",
        probe_labels(result, mode),
        url,
        metric_families,
        None,
    ) {
        Ok(_) => debug!(url, "pushed probe metrics"),
        Err(e) => warn!(url, error = %e, "failed to push metrics to prometheus"),
    }
}
