//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shipline_jobs_total` (counter): ship jobs by outcome
//! - `shipline_job_duration_seconds` (histogram): submit → completion
//! - `shipline_link_connects_total` (counter): link connect attempts by result
//! - `shipline_frames_total` / `shipline_frame_bytes_total` (counter): by direction
//! - `shipline_tunnels_total` (counter): CONNECT tunnels opened, by side
//! - `shipline_relay_bytes_total` (counter): tunnel bytes, by direction
//! - `shipline_forwarded_requests_total` (counter): offshore origin calls by status
//! - `shipline_active_connections` (gauge): live connections by kind
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_job(outcome: &'static str, started: Instant) {
    counter!("shipline_jobs_total", "outcome" => outcome).increment(1);
    histogram!("shipline_job_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_link_connect(result: &'static str) {
    counter!("shipline_link_connects_total", "result" => result).increment(1);
}

pub fn record_frame(direction: &'static str, len: usize) {
    counter!("shipline_frames_total", "direction" => direction).increment(1);
    counter!("shipline_frame_bytes_total", "direction" => direction).increment(len as u64);
}

pub fn record_tunnel(side: &'static str) {
    counter!("shipline_tunnels_total", "side" => side).increment(1);
}

pub fn record_relay(a_to_b: u64, b_to_a: u64) {
    counter!("shipline_relay_bytes_total", "direction" => "a_to_b").increment(a_to_b);
    counter!("shipline_relay_bytes_total", "direction" => "b_to_a").increment(b_to_a);
}

pub fn record_forward(status: u16) {
    counter!("shipline_forwarded_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_active_connections(kind: &'static str, count: u64) {
    gauge!("shipline_active_connections", "kind" => kind).set(count as f64);
}
