use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::io;
use tracing::{debug, warn};

/// A resource limit name (as used by `ulimit`/`limits.conf`) and its minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UlimitExpectation {
    pub resource: String,
    pub expected: u64,
}

impl UlimitExpectation {
    pub fn new(resource: &str, expected: u64) -> Self {
        UlimitExpectation {
            resource: resource.to_string(),
            expected,
        }
    }
}

pub fn default_expectations() -> Vec<UlimitExpectation> {
    vec![
        UlimitExpectation::new("nofile", 65536),
        UlimitExpectation::new("nproc", 8192),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Value(u64),
    Unlimited,
}

impl Limit {
    pub fn satisfies(self, expected: u64) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Value(value) => value >= expected,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Unlimited => f.write_str("unlimited"),
            Limit::Value(value) => write!(f, "{}", value),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UlimitCheck {
    pub resource: String,
    pub soft: Limit,
    pub hard: Limit,
    pub expected: u64,
}

impl UlimitCheck {
    /// Only the soft limit is what the process actually gets.
    pub fn matches(&self) -> bool {
        self.soft.satisfies(self.expected)
    }
}

#[cfg(target_os = "linux")]
fn read_limits(resource: &str) -> Option<io::Result<(Limit, Limit)>> {
    let id = match resource {
        "nofile" => libc::RLIMIT_NOFILE,
        "nproc" => libc::RLIMIT_NPROC,
        "core" => libc::RLIMIT_CORE,
        "stack" => libc::RLIMIT_STACK,
        "memlock" => libc::RLIMIT_MEMLOCK,
        "as" => libc::RLIMIT_AS,
        "fsize" => libc::RLIMIT_FSIZE,
        "cpu" => libc::RLIMIT_CPU,
        _ => return None,
    };
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit for the duration of the call.
    if unsafe { libc::getrlimit(id, &mut limit) } != 0 {
        return Some(Err(io::Error::last_os_error()));
    }
    let convert = |value: libc::rlim_t| {
        if value == libc::RLIM_INFINITY {
            Limit::Unlimited
        } else {
            Limit::Value(value as u64)
        }
    };
    Some(Ok((convert(limit.rlim_cur), convert(limit.rlim_max))))
}

#[cfg(not(target_os = "linux"))]
fn read_limits(_resource: &str) -> Option<io::Result<(Limit, Limit)>> {
    Some(Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "getrlimit is only wired up on Linux",
    )))
}

/// Unknown or unreadable resources are logged and left out of the result.
pub(crate) fn check_all(expectations: &[UlimitExpectation]) -> Vec<UlimitCheck> {
    debug!(count = expectations.len(), "checking ulimit resources");
    expectations
        .iter()
        .filter_map(|expectation| match read_limits(&expectation.resource) {
            None => {
                warn!(resource = %expectation.resource, "unknown resource limit, skipping");
                None
            }
            Some(Err(err)) => {
                warn!(
                    resource = %expectation.resource,
                    error = %err,
                    "failed to read resource limit"
                );
                None
            }
            Some(Ok((soft, hard))) => Some(UlimitCheck {
                resource: expectation.resource.clone(),
                soft,
                hard,
                expected: expectation.expected,
            }),
        })
        .collect()
}
