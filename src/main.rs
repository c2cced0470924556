use clap::Parser;
use netcheck::config::{CliOverrides, Config, ConfigError, Mode, OutputFormat, DEFAULT_CONFIG_FILE};
use netcheck::metrics::prom::prometheus_metrics;
use netcheck::{output, probe, HostInspector};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::exit;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Connectivity, TLS/STARTTLS handshake and host tuning checker
#[derive(Parser, Debug)]
#[command(name = "netcheck", version, about, long_about = None)]
struct Cli {
    /// Host to connect to
    #[arg(long)]
    host: Option<String>,

    /// Port to connect to [default: 443]
    #[arg(short, long)]
    port: Option<u16>,

    /// Connection timeout in seconds [default: 10]
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Test mode: tcp, tls, tls-insecure, tls-sni, tls-postgres, tls-ldap, ulimits, mm-env, sysctl
    #[arg(short, long)]
    mode: Option<String>,

    /// Custom SNI for TLS connections
    #[arg(long)]
    sni: Option<String>,

    /// Skip certificate verification in every TLS mode
    #[arg(long)]
    insecure: bool,

    /// Output format: text, json
    #[arg(short, long)]
    output: Option<String>,

    /// What the timeout bounds: exchange (dial, upgrade and handshake) or dial
    #[arg(long)]
    deadline: Option<String>,

    /// Configuration file [default: ./netcheck.toml if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Push probe metrics to a Prometheus Push Gateway
    #[arg(long)]
    prometheus: bool,

    /// Prometheus Push Gateway address
    #[arg(long)]
    prometheus_address: Option<String>,

    /// Print an example configuration file and exit
    #[arg(long)]
    example_config: bool,
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let file = match &cli.config {
        Some(path) => Some(Config::from_file(path)?),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            debug!(path = DEFAULT_CONFIG_FILE, "loading configuration file");
            Some(Config::from_file(DEFAULT_CONFIG_FILE)?)
        }
        None => None,
    };

    let overrides = CliOverrides {
        host: cli.host.clone(),
        port: cli.port,
        timeout: cli.timeout,
        mode: cli.mode.clone(),
        sni: cli.sni.clone(),
        insecure: cli.insecure.then_some(true),
        output: cli.output.clone(),
        deadline: cli.deadline.clone(),
        prometheus: cli.prometheus.then_some(true),
        prometheus_address: cli.prometheus_address.clone(),
    };

    let mut config = Config::defaults();
    if let Some(file) = file {
        config = config.merge_with(file);
    }
    Ok(config.merge_with(Config::from_cli_args(overrides)))
}

/// Runs the configured check and prints its result. `Ok(false)` means the
/// check ran and failed.
fn run(config: &Config) -> Result<bool, Box<dyn std::error::Error>> {
    let mode = config.mode()?;
    let format = config.output_format()?;
    let host = config.host.as_deref().unwrap_or_default();

    if mode.is_network() && host.is_empty() {
        return Err(ConfigError::Validation("host is required".to_string()).into());
    }

    match mode {
        Mode::Tcp => {
            let port = config.port.unwrap_or(netcheck::config::DEFAULT_PORT);
            let outcome = probe::check_tcp(host, port, config.timeout());
            match format {
                OutputFormat::Text => println!(
                    "{}",
                    output::render_tcp(host, port, &outcome, std::io::stdout().is_terminal())
                ),
                OutputFormat::Json => println!("{}", output::tcp_json(host, port, &outcome)?),
            }
            Ok(outcome.is_ok())
        }
        Mode::Tls | Mode::TlsInsecure | Mode::TlsSni | Mode::TlsPostgres | Mode::TlsLdap => {
            let request = config.probe_request()?;
            let result = probe::probe(&request);
            match format {
                OutputFormat::Text => println!("{}", output::render_probe(&result)),
                OutputFormat::Json => println!("{}", output::probe_json(&result)?),
            }
            if let Some(address) = config.prometheus_address() {
                prometheus_metrics(&result, &mode.to_string(), address);
            }
            Ok(result.success())
        }
        Mode::Ulimits => {
            let checks = HostInspector::new().ulimits(&config.ulimit_expectations())?;
            match format {
                OutputFormat::Text => {
                    println!("Resource Limits:");
                    println!("{}", output::ulimit_table(&checks));
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&checks)?),
            }
            Ok(true)
        }
        Mode::Sysctl => {
            let checks = HostInspector::new().sysctls(&config.sysctl_expectations())?;
            match format {
                OutputFormat::Text => {
                    println!("Sysctl Parameters:");
                    println!("{}", output::sysctl_table(&checks));
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&checks)?),
            }
            Ok(true)
        }
        Mode::MmEnv => {
            let name = config.process_name();
            let vars = HostInspector::new().process_environment(name, config.env_prefix())?;
            match format {
                OutputFormat::Text => {
                    println!("{} Environment Variables ({} total):", name, vars.len());
                    println!("{}", output::environment_table(&vars));
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&vars)?),
            }
            Ok(true)
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.example_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            exit(1);
        }
    };

    match run(&config) {
        Ok(true) => exit(0),
        Ok(false) => exit(1),
        Err(err) => {
            eprintln!("Error: {}", err);
            exit(1);
        }
    }
}
