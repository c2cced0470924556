//! Local host diagnostics: kernel tunables, resource limits and the
//! environment of a running process.
//!
//! Everything here reads `/proc` or calls `getrlimit(2)` and is only
//! available on Linux. On other systems each check returns
//! [`DiagnosticError::Unsupported`].

pub mod environ;
pub mod sysctl;
pub mod ulimit;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub use environ::EnvVar;
pub use sysctl::{SysctlCheck, SysctlExpectation};
pub use ulimit::{Limit, UlimitCheck, UlimitExpectation};

/// Process looked up by the environment check unless configured otherwise.
pub const DEFAULT_PROCESS_NAME: &str = "mattermost";
/// Prefix of the variables reported by the environment check.
pub const DEFAULT_ENV_PREFIX: &str = "MM_";

/// Errors raised by host diagnostics.
#[derive(Debug)]
pub enum DiagnosticError {
    /// The check needs Linux
    Unsupported {
        /// What was attempted
        feature: &'static str,
        /// The running OS
        os: &'static str,
    },
    /// The proc filesystem could not be listed
    ProcfsUnavailable {
        path: PathBuf,
        source: io::Error,
    },
    /// No process with the requested name is running
    ProcessNotFound { name: String },
    /// The process exists but its environment cannot be read
    EnvironmentUnreadable { pid: u32, source: io::Error },
    /// The process environment has no variable with the prefix
    NoMatchingVariables { pid: u32, prefix: String },
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { feature, os } => {
                write!(f, "{} is only supported on Linux, current OS: {}", feature, os)
            }
            Self::ProcfsUnavailable { path, source } => {
                write!(f, "procfs access failed at {}: {}", path.display(), source)
            }
            Self::ProcessNotFound { name } => write!(f, "{} process not found", name),
            Self::EnvironmentUnreadable { pid, source } => {
                write!(f, "failed to read environment for PID {}: {}", pid, source)
            }
            Self::NoMatchingVariables { pid, prefix } => {
                write!(f, "no {} environment variables found for PID {}", prefix, pid)
            }
        }
    }
}

impl std::error::Error for DiagnosticError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ProcfsUnavailable { source, .. } => Some(source),
            Self::EnvironmentUnreadable { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn ensure_linux(feature: &'static str) -> Result<(), DiagnosticError> {
    if cfg!(target_os = "linux") {
        Ok(())
    } else {
        Err(DiagnosticError::Unsupported {
            feature,
            os: std::env::consts::OS,
        })
    }
}

/// Entry point for the host checks, rooted at a proc filesystem.
#[derive(Debug, Clone)]
pub struct HostInspector {
    proc_root: PathBuf,
}

impl Default for HostInspector {
    fn default() -> Self {
        HostInspector::new()
    }
}

impl HostInspector {
    pub fn new() -> Self {
        HostInspector {
            proc_root: PathBuf::from("/proc"),
        }
    }

    /// Reads `/proc` data from `root` instead, e.g. a container's mount.
    pub fn with_proc_root<P: AsRef<Path>>(root: P) -> Self {
        HostInspector {
            proc_root: root.as_ref().to_path_buf(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    /// Reads each tunable and compares it with its expectation, sorted by name.
    pub fn sysctls(
        &self,
        expectations: &[SysctlExpectation],
    ) -> Result<Vec<SysctlCheck>, DiagnosticError> {
        ensure_linux("sysctl reading")?;
        Ok(sysctl::check_all(&self.proc_root, expectations))
    }

    /// Reads the current process's soft and hard limits.
    pub fn ulimits(
        &self,
        expectations: &[UlimitExpectation],
    ) -> Result<Vec<UlimitCheck>, DiagnosticError> {
        ensure_linux("ulimits")?;
        Ok(ulimit::check_all(expectations))
    }

    /// Environment variables starting with `prefix` of the first process named `name`.
    pub fn process_environment(
        &self,
        name: &str,
        prefix: &str,
    ) -> Result<Vec<EnvVar>, DiagnosticError> {
        ensure_linux("reading process environment variables")?;
        environ::filtered_environment(&self.proc_root, name, prefix)
    }
}
