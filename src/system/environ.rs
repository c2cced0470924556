use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::DiagnosticError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    fn parse(entry: &str) -> Self {
        match entry.split_once('=') {
            Some((name, value)) => EnvVar {
                name: name.to_string(),
                value: value.to_string(),
            },
            None => EnvVar {
                name: entry.to_string(),
                value: String::new(),
            },
        }
    }
}

/// PID of the lowest-numbered process whose `comm` is `name`.
pub fn find_process(proc_root: &Path, name: &str) -> Result<u32, DiagnosticError> {
    let entries = fs::read_dir(proc_root).map_err(|source| DiagnosticError::ProcfsUnavailable {
        path: proc_root.to_path_buf(),
        source,
    })?;

    let mut pids: Vec<u32> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    pids.sort_unstable();

    // processes may exit while we walk the list; unreadable ones are skipped
    pids.into_iter()
        .find(|pid| {
            fs::read_to_string(proc_root.join(pid.to_string()).join("comm"))
                .map(|comm| comm.trim_end_matches('\n') == name)
                .unwrap_or(false)
        })
        .ok_or_else(|| DiagnosticError::ProcessNotFound {
            name: name.to_string(),
        })
}

/// Reads the NUL-separated environment of `pid`.
pub fn read_environ(proc_root: &Path, pid: u32) -> Result<Vec<String>, DiagnosticError> {
    let raw = fs::read(proc_root.join(pid.to_string()).join("environ"))
        .map_err(|source| DiagnosticError::EnvironmentUnreadable { pid, source })?;
    Ok(raw
        .split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .map(|entry| String::from_utf8_lossy(entry).into_owned())
        .collect())
}

pub(crate) fn filtered_environment(
    proc_root: &Path,
    name: &str,
    prefix: &str,
) -> Result<Vec<EnvVar>, DiagnosticError> {
    let pid = find_process(proc_root, name)?;
    debug!(name, pid, "found process");

    let mut entries: Vec<String> = read_environ(proc_root, pid)?
        .into_iter()
        .filter(|entry| entry.starts_with(prefix))
        .collect();
    if entries.is_empty() {
        return Err(DiagnosticError::NoMatchingVariables {
            pid,
            prefix: prefix.to_string(),
        });
    }
    entries.sort();
    Ok(entries.iter().map(|entry| EnvVar::parse(entry)).collect())
}
