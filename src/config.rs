//! Configuration file management for netcheck.
//!
//! This module handles loading, parsing, and merging configuration from TOML files
//! and command-line arguments.
//!
//! # Configuration Precedence
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (`netcheck.toml` in the working directory, or `--config`)
//! 3. Command-line arguments (highest priority)
//!
//! # Example Configuration File
//!
//! ```toml
//! host = "db.internal"
//! port = 5432
//! timeout = 5
//! mode = "tls-postgres"
//! output = "text"
//!
//! [process]
//! name = "mattermost"
//! env_prefix = "MM_"
//!
//! [[sysctl]]
//! name = "net.core.somaxconn"
//! expected = "4096"
//!
//! [prometheus]
//! enabled = true
//! address = "http://localhost:9091"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use strum_macros::{Display, EnumIter, EnumString};

use crate::probe::{DeadlineScope, ProbeRequest, Variant};
use crate::system::{
    sysctl, ulimit, SysctlExpectation, UlimitExpectation, DEFAULT_ENV_PREFIX, DEFAULT_PROCESS_NAME,
};
use crate::ProbeError;

/// Configuration file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "netcheck.toml";
pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// What the tool checks on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Mode {
    Tcp,
    Tls,
    TlsInsecure,
    TlsSni,
    TlsPostgres,
    TlsLdap,
    Ulimits,
    MmEnv,
    Sysctl,
}

impl Mode {
    /// Whether the mode talks to a remote host (and therefore needs one).
    pub fn is_network(self) -> bool {
        !matches!(self, Mode::Ulimits | Mode::MmEnv | Mode::Sysctl)
    }

    /// Probe variant for the TLS modes.
    pub fn variant(self) -> Option<Variant> {
        match self {
            Mode::Tls | Mode::TlsInsecure | Mode::TlsSni => Some(Variant::Tls),
            Mode::TlsPostgres => Some(Variant::PostgresStartTls),
            Mode::TlsLdap => Some(Variant::LdapStartTls),
            Mode::Tcp | Mode::Ulimits | Mode::MmEnv | Mode::Sysctl => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Main configuration structure for netcheck.
///
/// All fields are optional to support partial configuration and merging.
/// Missing values will be filled in by defaults or overridden by CLI arguments.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    /// Host to connect to
    pub host: Option<String>,
    /// Port to connect to
    pub port: Option<u16>,
    /// Timeout in seconds
    pub timeout: Option<u64>,
    /// Check to run: tcp, tls, tls-insecure, tls-sni, tls-postgres, tls-ldap, ulimits, mm-env, sysctl
    pub mode: Option<String>,
    /// SNI announced instead of the host
    pub sni: Option<String>,
    /// Skip certificate verification in every TLS mode
    pub insecure: Option<bool>,
    /// Output format: text, json
    pub output: Option<String>,
    /// Deadline scope: exchange (whole probe) or dial (connect only)
    pub deadline: Option<String>,
    /// Process environment check settings
    pub process: Option<ProcessConfig>,
    /// Sysctl expectations replacing the built-in table
    pub sysctl: Option<Vec<SysctlExpectation>>,
    /// Ulimit expectations replacing the built-in table
    pub ulimit: Option<Vec<UlimitExpectation>>,
    /// Prometheus configuration
    pub prometheus: Option<PrometheusConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ProcessConfig {
    /// Process name as shown in /proc/<pid>/comm
    pub name: Option<String>,
    /// Only variables starting with this prefix are shown
    pub env_prefix: Option<String>,
}

/// Prometheus integration configuration.
///
/// Controls whether probe metrics are pushed to a Prometheus Push Gateway
/// and specifies the gateway address.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct PrometheusConfig {
    /// Enable prometheus metrics pushing
    pub enabled: Option<bool>,
    /// Prometheus push gateway address (e.g., "http://localhost:9091")
    pub address: Option<String>,
}

/// Values given on the command line, all optional so they only override
/// what was actually passed.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout: Option<u64>,
    pub mode: Option<String>,
    pub sni: Option<String>,
    pub insecure: Option<bool>,
    pub output: Option<String>,
    pub deadline: Option<String>,
    pub prometheus: Option<bool>,
    pub prometheus_address: Option<String>,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully parsed configuration
    /// * `Err(ConfigError::Io)` - File could not be read
    /// * `Err(ConfigError::Parse)` - File contains invalid TOML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Creates a configuration holding the built-in defaults.
    ///
    /// # Default Values
    ///
    /// - `host`: None (must be provided for network modes)
    /// - `port`: 443
    /// - `timeout`: 10 seconds
    /// - `mode`: "tcp"
    /// - `insecure`: false
    /// - `output`: "text"
    /// - `deadline`: "exchange"
    /// - `process`: mattermost / MM_
    /// - `prometheus.enabled`: false
    /// - `prometheus.address`: "http://localhost:9091"
    pub fn defaults() -> Self {
        Config {
            host: None,
            port: Some(DEFAULT_PORT),
            timeout: Some(DEFAULT_TIMEOUT_SECS),
            mode: Some(Mode::Tcp.to_string()),
            sni: None,
            insecure: Some(false),
            output: Some(OutputFormat::Text.to_string()),
            deadline: Some(DeadlineScope::Exchange.to_string()),
            process: Some(ProcessConfig {
                name: Some(DEFAULT_PROCESS_NAME.to_string()),
                env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
            }),
            sysctl: None,
            ulimit: None,
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                address: Some("http://localhost:9091".to_string()),
            }),
        }
    }

    /// Merges this configuration with another, prioritizing the other's values.
    ///
    /// For each field, if the `other` config has a value (Some), it overrides
    /// this config's value. If the `other` value is None, keeps the current value.
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.mode.is_some() {
            self.mode = other.mode;
        }
        if other.sni.is_some() {
            self.sni = other.sni;
        }
        if other.insecure.is_some() {
            self.insecure = other.insecure;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        if other.deadline.is_some() {
            self.deadline = other.deadline;
        }
        if other.sysctl.is_some() {
            self.sysctl = other.sysctl;
        }
        if other.ulimit.is_some() {
            self.ulimit = other.ulimit;
        }
        if let Some(other_process) = other.process {
            if let Some(ref mut self_process) = self.process {
                if other_process.name.is_some() {
                    self_process.name = other_process.name;
                }
                if other_process.env_prefix.is_some() {
                    self_process.env_prefix = other_process.env_prefix;
                }
            } else {
                self.process = Some(other_process);
            }
        }
        if let Some(other_prom) = other.prometheus {
            if let Some(ref mut self_prom) = self.prometheus {
                if other_prom.enabled.is_some() {
                    self_prom.enabled = other_prom.enabled;
                }
                if other_prom.address.is_some() {
                    self_prom.address = other_prom.address;
                }
            } else {
                self.prometheus = Some(other_prom);
            }
        }
        self
    }

    /// Creates a Config from command-line arguments for merging.
    ///
    /// Only provided arguments (Some values) will override other configurations.
    pub fn from_cli_args(args: CliOverrides) -> Self {
        let prometheus = if args.prometheus.is_some() || args.prometheus_address.is_some() {
            Some(PrometheusConfig {
                enabled: args.prometheus,
                address: args.prometheus_address,
            })
        } else {
            None
        };
        Config {
            host: args.host,
            port: args.port,
            timeout: args.timeout,
            mode: args.mode,
            sni: args.sni,
            insecure: args.insecure,
            output: args.output,
            deadline: args.deadline,
            process: None,
            sysctl: None,
            ulimit: None,
            prometheus,
        }
    }

    /// Generates an example configuration file in TOML format.
    pub fn example_toml() -> String {
        let example = Config {
            host: Some("db.internal".to_string()),
            port: Some(5432),
            timeout: Some(5),
            mode: Some(Mode::TlsPostgres.to_string()),
            sni: Some("postgres.example.com".to_string()),
            insecure: Some(false),
            output: Some(OutputFormat::Text.to_string()),
            deadline: Some(DeadlineScope::Exchange.to_string()),
            process: Some(ProcessConfig {
                name: Some(DEFAULT_PROCESS_NAME.to_string()),
                env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
            }),
            sysctl: Some(sysctl::default_expectations()),
            ulimit: Some(ulimit::default_expectations()),
            prometheus: Some(PrometheusConfig {
                enabled: Some(true),
                address: Some("http://localhost:9091".to_string()),
            }),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }

    pub fn mode(&self) -> Result<Mode, ConfigError> {
        let raw = self.mode.as_deref().unwrap_or("tcp");
        Mode::from_str(raw).map_err(|_| {
            ConfigError::Validation(format!(
                "unknown mode '{}'. Available modes: tcp, tls, tls-insecure, tls-sni, tls-postgres, tls-ldap, ulimits, mm-env, sysctl",
                raw
            ))
        })
    }

    pub fn output_format(&self) -> Result<OutputFormat, ConfigError> {
        let raw = self.output.as_deref().unwrap_or("text");
        OutputFormat::from_str(raw)
            .map_err(|_| ConfigError::Validation(format!("unknown output format '{}'", raw)))
    }

    pub fn deadline_scope(&self) -> Result<DeadlineScope, ConfigError> {
        match self.deadline.as_deref() {
            None => Ok(DeadlineScope::default()),
            Some(raw) => DeadlineScope::from_str(&raw.to_ascii_lowercase())
                .map_err(|_| ConfigError::Validation(format!("unknown deadline scope '{}'", raw))),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn process_name(&self) -> &str {
        self.process
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .unwrap_or(DEFAULT_PROCESS_NAME)
    }

    pub fn env_prefix(&self) -> &str {
        self.process
            .as_ref()
            .and_then(|p| p.env_prefix.as_deref())
            .unwrap_or(DEFAULT_ENV_PREFIX)
    }

    pub fn sysctl_expectations(&self) -> Vec<SysctlExpectation> {
        self.sysctl
            .clone()
            .unwrap_or_else(sysctl::default_expectations)
    }

    pub fn ulimit_expectations(&self) -> Vec<UlimitExpectation> {
        self.ulimit
            .clone()
            .unwrap_or_else(ulimit::default_expectations)
    }

    pub fn prometheus_address(&self) -> Option<&str> {
        let prom = self.prometheus.as_ref()?;
        if prom.enabled == Some(true) {
            prom.address.as_deref()
        } else {
            None
        }
    }

    /// Builds the probe request for a TLS mode.
    ///
    /// Fails with a validation error when the mode is not a TLS mode, when
    /// `tls-sni` is used without an SNI, or when host/port/timeout are invalid.
    pub fn probe_request(&self) -> Result<ProbeRequest, ConfigError> {
        let mode = self.mode()?;
        let variant = mode
            .variant()
            .ok_or_else(|| ConfigError::Validation(format!("mode '{}' is not a TLS mode", mode)))?;
        let host = self.host.as_deref().unwrap_or_default();
        let port = self.port.unwrap_or(DEFAULT_PORT);

        let mut request = ProbeRequest::new(host, port, self.timeout(), variant)?
            .with_deadline_scope(self.deadline_scope()?)
            .with_verification(mode != Mode::TlsInsecure && self.insecure != Some(true));

        match (mode, self.sni.as_deref()) {
            (Mode::TlsSni, None) | (Mode::TlsSni, Some("")) => {
                return Err(ConfigError::Validation(
                    "SNI is required for tls-sni mode".to_string(),
                ));
            }
            (_, Some(sni)) if !sni.is_empty() => {
                request = request.with_server_name(sni)?;
            }
            _ => {}
        }
        Ok(request)
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (missing required fields, invalid values, etc.)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ProbeError> for ConfigError {
    fn from(e: ProbeError) -> Self {
        ConfigError::Validation(e.to_string())
    }
}
