use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// A tunable and the value it is expected to have (at least).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysctlExpectation {
    pub name: String,
    pub expected: String,
}

impl SysctlExpectation {
    pub fn new(name: &str, expected: &str) -> Self {
        SysctlExpectation {
            name: name.to_string(),
            expected: expected.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SysctlCheck {
    pub name: String,
    pub expected: String,
    /// `None` when the parameter could not be read.
    pub actual: Option<String>,
    pub matches: bool,
}

impl SysctlCheck {
    pub fn actual_display(&self) -> &str {
        self.actual.as_deref().unwrap_or("not found")
    }
}

/// Network and VM tunables recommended for a busy application server.
pub fn default_expectations() -> Vec<SysctlExpectation> {
    [
        ("net.ipv4.ip_local_port_range", "1025 65000"),
        ("net.ipv4.tcp_fin_timeout", "30"),
        ("net.ipv4.tcp_tw_reuse", "1"),
        ("net.core.somaxconn", "4096"),
        ("net.ipv4.tcp_max_syn_backlog", "8192"),
        ("vm.min_free_kbytes", "167772"),
        ("net.ipv4.tcp_slow_start_after_idle", "0"),
        ("net.ipv4.tcp_congestion_control", "bbr"),
        ("net.core.default_qdisc", "fq"),
        ("net.ipv4.tcp_notsent_lowat", "16384"),
        ("net.ipv4.tcp_rmem", "4096 156250 625000"),
        ("net.ipv4.tcp_wmem", "4096 156250 625000"),
        ("net.core.rmem_max", "312500"),
        ("net.core.wmem_max", "312500"),
        ("net.core.rmem_default", "312500"),
        ("net.core.wmem_default", "312500"),
        ("net.ipv4.tcp_mem", "1638400 1638400 1638400"),
    ]
    .iter()
    .map(|(name, expected)| SysctlExpectation::new(name, expected))
    .collect()
}

/// Reads `name` below `<proc_root>/sys`, fields joined by single spaces.
pub fn read(proc_root: &Path, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let path = proc_root.join("sys").join(name.replace('.', "/"));
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let value = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            if value.is_empty() {
                None
            } else {
                Some(value)
            }
        }
        Err(err) => {
            debug!(name, path = %path.display(), error = %err, "failed to read sysctl");
            None
        }
    }
}

/// Equal strings match. Otherwise both sides must have the same number of
/// integer fields and every actual field must be at least the expected one.
pub fn compare(expected: &str, actual: &str) -> bool {
    let expected = expected.trim();
    let actual = actual.trim();
    if expected == actual {
        return true;
    }

    let expected_fields: Vec<&str> = expected.split_whitespace().collect();
    let actual_fields: Vec<&str> = actual.split_whitespace().collect();
    if expected_fields.len() != actual_fields.len() {
        return false;
    }

    expected_fields
        .iter()
        .zip(actual_fields.iter())
        .all(|(exp, act)| match (exp.parse::<i64>(), act.parse::<i64>()) {
            (Ok(exp), Ok(act)) => act >= exp,
            _ => false,
        })
}

pub(crate) fn check_all(proc_root: &Path, expectations: &[SysctlExpectation]) -> Vec<SysctlCheck> {
    debug!(count = expectations.len(), "checking sysctl parameters");
    let mut checks: Vec<SysctlCheck> = expectations
        .iter()
        .map(|expectation| {
            let actual = read(proc_root, &expectation.name);
            let matches = actual
                .as_deref()
                .map(|value| compare(&expectation.expected, value))
                .unwrap_or(false);
            SysctlCheck {
                name: expectation.name.clone(),
                expected: expectation.expected.clone(),
                actual,
                matches,
            }
        })
        .collect();
    checks.sort_by(|a, b| a.name.cmp(&b.name));
    checks
}
