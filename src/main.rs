/// Version injected at compile time via M365_PROVIDER_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("M365_PROVIDER_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use m365_provider::config::{self, EnvironmentSnapshot};
use m365_provider::{bundle_from_resolved, cloud, ResolvedConfiguration};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Diagnostics for the Microsoft 365 provider configuration
#[derive(Parser, Debug)]
#[command(name = "m365-provider", version, about, long_about = None)]
struct Args {
    /// Declarative configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved configuration with secrets redacted
    Resolve {
        #[arg(long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },
    /// Validate the configuration and assemble the client bundle
    Check,
    /// Acquire one access token with the configured credential
    Token {
        /// Tenant to request the token for (defaults to the configured tenant)
        #[arg(long)]
        tenant: Option<String>,

        /// Print the raw token instead of only its expiry
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: cannot open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("m365-provider {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("m365-provider").join("m365-provider.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".m365-provider").join("m365-provider.log");
    }
    PathBuf::from("m365-provider.log")
}

fn print_resolved(cfg: &ResolvedConfiguration, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(cfg).context("Failed to render YAML")?,
        OutputFormat::Json => serde_json::to_string_pretty(cfg).context("Failed to render JSON")?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let raw = config::load_declared(args.config.as_deref()).context("Failed to load configuration")?;
    let cfg = config::resolve(&raw, &EnvironmentSnapshot::from_process());

    // debug_mode only raises the level when none was asked for
    let level = if args.log_level == LogLevel::Off && cfg.debug_mode {
        LogLevel::Debug
    } else {
        args.log_level
    };
    let _log_guard = setup_logging(level);

    match args.command {
        Command::Resolve { format } => print_resolved(&cfg, format)?,
        Command::Check => {
            let endpoints = cloud::lookup(&cfg.cloud).context("Invalid cloud")?;
            let bundle = bundle_from_resolved(&cfg, endpoints).context("Invalid configuration")?;
            println!("cloud:      {}", cfg.cloud);
            println!("authority:  {}", bundle.endpoints().authority_url);
            println!("graph v1.0: {}", bundle.endpoints().service_root_v1);
            println!("graph beta: {}", bundle.endpoints().service_root_beta);
            println!("auth:       {}", bundle.credential().method());
            println!("pipeline:   {:?}", bundle.transport().pipeline().stage_names());
        }
        Command::Token { tenant, show } => {
            let endpoints = cloud::lookup(&cfg.cloud).context("Invalid cloud")?;
            let bundle = bundle_from_resolved(&cfg, endpoints).context("Invalid configuration")?;
            let credential = bundle.credential();
            credential.set_prompt(Arc::new(|message: &str| eprintln!("{}", message)));
            let token = match tenant {
                Some(tenant) => credential.get_token_for_tenant(&tenant).await,
                None => credential.get_token().await,
            }
            .context("Failed to acquire token")?;

            if show {
                println!("{}", token.token);
            } else {
                println!("Token acquired, expires {}", token.expires_on.to_rfc3339());
            }
        }
    }

    Ok(())
}
