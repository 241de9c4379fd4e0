//! Tollgate - Main entry point
//!
//! Runs the certificate lifecycle manager against a line-delimited JSON
//! event stream on stdin, reporting outcomes on stdout.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use tollgate::{
    expiry_of, run_event_stream, CertificateDirectory, FileSecretStore, Hostname,
    KeyMaterialStore, KeyOptions, LifecycleManager, SpoolExchange,
};
use tollgate_config::validate::validate_certificates;
use tollgate_config::Config;

/// Tollgate - TLS certificate lifecycle manager for reverse-proxy nodes
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "TOLLGATE_CONFIG", global = true)]
    config: Option<String>,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Log output format (logs always go to stderr)
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and the certificate directory, then exit
    Test,
    /// Process lifecycle events from stdin (default)
    Run,
    /// Show every known hostname with its certificate and key status
    Status,
    /// Remove every certificate bundle and every stored key
    Purge {
        /// Confirm the purge
        #[arg(long = "yes")]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let config_path = cli.config.as_deref();

    if cli.test {
        return test_config(config_path);
    }

    match cli.command {
        Some(Commands::Test) => test_config(config_path),
        Some(Commands::Status) => show_status(config_path),
        Some(Commands::Purge { yes }) => purge(config_path, yes),
        Some(Commands::Run) | None => run(config_path),
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Load and structurally validate the configuration
fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            Config::from_file(path).context("Failed to load configuration file")?
        }
        None => {
            info!("No configuration specified, using embedded default configuration");
            Config::default_embedded().context("Failed to load embedded configuration")?
        }
    };

    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

fn build_manager(config: &Config) -> Result<LifecycleManager> {
    let secrets = FileSecretStore::new(&config.storage.secrets_dir).with_context(|| {
        format!(
            "Failed to open secret store at {}",
            config.storage.secrets_dir.display()
        )
    })?;
    let keys = KeyMaterialStore::new(Arc::new(secrets), KeyOptions::from(&config.keys));

    let exchange = SpoolExchange::new(&config.storage.outbox_dir).with_context(|| {
        format!(
            "Failed to open CSR outbox at {}",
            config.storage.outbox_dir.display()
        )
    })?;

    let directory =
        CertificateDirectory::new(&config.storage.certificates_dir).with_context(|| {
            format!(
                "Failed to open certificate directory at {}",
                config.storage.certificates_dir.display()
            )
        })?;

    Ok(LifecycleManager::new(keys, Arc::new(exchange), directory))
}

/// Test configuration file and exit
fn test_config(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;

    let result = validate_certificates(&config);
    for warning in &result.warnings {
        warn!("{}", warning);
    }
    for error in &result.errors {
        tracing::error!("{}", error);
    }

    info!("Configuration test results:");
    info!("  - {} configured hostname(s)", config.certificates.hostnames.len());
    info!("  - {} warning(s)", result.warnings.len());
    info!("  - {} error(s)", result.errors.len());

    if !result.is_ok() {
        bail!(
            "certificate directory validation failed with {} error(s)",
            result.errors.len()
        );
    }

    println!(
        "tollgate: configuration file {} test is successful",
        config_path.unwrap_or("(embedded)")
    );
    Ok(())
}

/// Request configured hostnames, then handle events until EOF or Ctrl-C
fn run(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let mut manager = build_manager(&config)?;

    manager
        .restore()
        .context("Failed to restore state from the certificate directory")?;

    for hostname in &config.certificates.hostnames {
        match manager.request_certificate(hostname) {
            Ok(outcome) => info!(hostname = %hostname, ?outcome, "Configured hostname requested"),
            Err(e) => warn!(
                hostname = %hostname,
                error = %e,
                "Failed to request certificate for configured hostname"
            ),
        }
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let summary = runtime.block_on(async {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();

        tokio::select! {
            result = run_event_stream(&mut manager, stdin, stdout) => result.map(Some),
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, stopping event processing");
                Ok(None)
            }
        }
    })?;

    if let Some(summary) = summary {
        info!(
            events = summary.events,
            failed = summary.failed,
            "Tollgate finished processing events"
        );
    }
    Ok(())
}

/// Print hostname, bundle presence, key presence and expiry
fn show_status(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let manager = build_manager(&config)?;

    let mut hostnames: BTreeSet<Hostname> = config.certificates.hostnames.iter().cloned().collect();
    hostnames.extend(manager.directory().list()?);
    hostnames.extend(manager.keys().hostnames()?);

    let warning_days = i64::from(config.certificates.expiry_warning_days);
    let now = Utc::now();

    println!("{:<40} {:<12} {:<5} EXPIRES", "HOSTNAME", "CERTIFICATE", "KEY");
    for hostname in &hostnames {
        let bundle = manager.read_certificate_from_unit(hostname)?;
        let has_key = manager.keys().contains(hostname)?;

        let expires = match bundle.as_deref().map(expiry_of) {
            Some(Ok(expiry)) => {
                let days_left = (expiry - now).num_days();
                if days_left < 0 {
                    format!("{} (expired)", expiry.format("%Y-%m-%d"))
                } else if days_left <= warning_days {
                    format!("{} ({} days, renew soon)", expiry.format("%Y-%m-%d"), days_left)
                } else {
                    format!("{} ({} days)", expiry.format("%Y-%m-%d"), days_left)
                }
            }
            Some(Err(e)) => format!("unreadable: {}", e),
            None => "-".to_string(),
        };

        println!(
            "{:<40} {:<12} {:<5} {}",
            hostname.as_str(),
            if bundle.is_some() { "present" } else { "absent" },
            if has_key { "yes" } else { "no" },
            expires
        );
    }

    Ok(())
}

/// Invalidate everything from the command line
fn purge(config_path: Option<&str>, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("refusing to purge without --yes");
    }

    let config = load_config(config_path)?;
    let mut manager = build_manager(&config)?;
    manager.restore()?;

    let summary = manager
        .all_certificates_invalidated()
        .context("Failed to invalidate certificates")?;

    println!(
        "tollgate: removed {} certificate bundle(s) and {} key(s)",
        summary.artifacts_removed, summary.keys_removed
    );
    Ok(())
}
