//! Rendering of check results for the terminal or as JSON.

use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use std::time::Duration;

use crate::names::{CipherSuite, ProtocolVersion};
use crate::probe::{ProbeResult, Variant};
use crate::system::{EnvVar, SysctlCheck, UlimitCheck};
use crate::ProbeError;

/// Serializable view of a [`ProbeResult`].
#[derive(Debug, Serialize)]
pub struct ProbeReport<'a> {
    pub host: &'a str,
    pub port: u16,
    pub variant: Variant,
    pub success: bool,
    pub elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<ProtocolVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_suite: Option<CipherSuite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_certificates: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> From<&'a ProbeResult> for ProbeReport<'a> {
    fn from(result: &'a ProbeResult) -> Self {
        let handshake = result.handshake();
        ProbeReport {
            host: result.host(),
            port: result.port(),
            variant: result.variant(),
            success: result.success(),
            elapsed_ms: result.elapsed().as_millis(),
            version: handshake.map(|h| h.version),
            cipher_suite: handshake.map(|h| h.cipher_suite),
            server_name: handshake.map(|h| h.server_name.as_str()),
            peer_certificates: handshake.map(|h| h.peer_certificates),
            error: result.failure().map(|e| e.to_string()),
        }
    }
}

/// Text block describing a TLS probe.
pub fn render_probe(result: &ProbeResult) -> String {
    let target = format!("{}:{}", result.host(), result.port());
    match (result.handshake(), result.failure()) {
        (Some(handshake), _) => format!(
            "TLS connection to {} successful\n  TLS Version: {}\n  Cipher Suite: {}\n  Server Name: {}\n  Peer Certificates: {}",
            target,
            handshake.version,
            handshake.cipher_suite,
            handshake.server_name,
            handshake.peer_certificates
        ),
        (None, Some(err)) => format!("TLS connection to {} failed: {}", target, err),
        (None, None) => format!("TLS connection to {} failed", target),
    }
}

pub fn probe_json(result: &ProbeResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&ProbeReport::from(result))
}

#[derive(Debug, Serialize)]
struct TcpReport<'a> {
    host: &'a str,
    port: u16,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// One status line for a TCP check, colored when `color` is set.
pub fn render_tcp(
    host: &str,
    port: u16,
    outcome: &Result<Duration, ProbeError>,
    color: bool,
) -> String {
    let line = match outcome {
        Ok(_) => format!("TCP connection to {}:{} successful", host, port),
        Err(err) => format!("TCP connection to {}:{} failed: {}", host, port, err),
    };
    match (color, outcome.is_ok()) {
        (false, _) => line,
        (true, true) => line.green().bold().to_string(),
        (true, false) => line.red().bold().to_string(),
    }
}

pub fn tcp_json(
    host: &str,
    port: u16,
    outcome: &Result<Duration, ProbeError>,
) -> serde_json::Result<String> {
    let report = TcpReport {
        host,
        port,
        success: outcome.is_ok(),
        elapsed_ms: outcome.as_ref().ok().map(|d| d.as_millis()),
        error: outcome.as_ref().err().map(|e| e.to_string()),
    };
    serde_json::to_string_pretty(&report)
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn status_cells(ok: bool, actual: String) -> (Cell, Cell) {
    let color = if ok { Color::Green } else { Color::Red };
    let status = if ok { "OK" } else { "FAIL" };
    (Cell::new(actual).fg(color), Cell::new(status).fg(color))
}

pub fn sysctl_table(checks: &[SysctlCheck]) -> Table {
    let mut table = new_table(vec!["Parameter", "Expected", "Actual", "Status"]);
    for check in checks {
        let (actual, status) = status_cells(check.matches, check.actual_display().to_string());
        table.add_row(vec![
            Cell::new(&check.name),
            Cell::new(&check.expected),
            actual,
            status,
        ]);
    }
    table
}

pub fn ulimit_table(checks: &[UlimitCheck]) -> Table {
    let mut table = new_table(vec!["Resource", "Expected", "Actual", "Hard", "Status"]);
    for check in checks {
        let (actual, status) = status_cells(check.matches(), check.soft.to_string());
        table.add_row(vec![
            Cell::new(&check.resource),
            Cell::new(check.expected),
            actual,
            Cell::new(check.hard.to_string()),
            status,
        ]);
    }
    table
}

pub fn environment_table(vars: &[EnvVar]) -> Table {
    let mut table = new_table(vec!["Variable", "Value"]);
    for var in vars {
        table.add_row(vec![Cell::new(&var.name), Cell::new(&var.value)]);
    }
    table
}
