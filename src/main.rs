use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hxpolicy::alert::{Alerter, SmtpRelay};
use hxpolicy::api::{
    Credentials, FileToken, HttpClient, ObjectId, Outcome, ResourceClient, ResourcePath,
    StaticToken, TokenProvider,
};
use hxpolicy::config::{Config, TokenSource, TOKEN_ENV};
use hxpolicy::policy::{default_policies, indexed_label, load_policies, PolicySpec};
use hxpolicy::workflow::{Run, RunStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Provision HyperFlex Edge policies on Intersight
#[derive(Parser, Debug)]
#[command(name = "hxpolicy", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// API base URL, overrides the configuration file
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Policy file (YAML or JSON) replacing the built-in policy set
    #[arg(long, global = true)]
    policies: Option<PathBuf>,

    /// Maximum policy creations in flight
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Log file (appended to)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Check availability, then create every policy (default)
    Apply,
    /// Run the availability check only
    Check,
    /// Print the policy set that `apply` would submit
    ListPolicies,
    /// Read a collection, or one object when an id is given
    Get {
        /// Resource path, e.g. hyperflex/SysConfigPolicies
        path: String,
        /// Object id (Moid)
        id: Option<String>,
    },
    /// Delete one object
    Delete {
        /// Resource path, e.g. hyperflex/SysConfigPolicies
        path: String,
        /// Object id (Moid)
        id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
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

fn setup_logging(
    level: LogLevel,
    log_path: PathBuf,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

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

    tracing::info!("hxpolicy started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("hxpolicy").join("hxpolicy.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".hxpolicy").join("hxpolicy.log");
    }
    PathBuf::from("hxpolicy.log")
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_path = args.log_file.clone().unwrap_or_else(get_log_path);
    let log_guard = match setup_logging(args.log_level, log_path) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:?}");
            std::process::exit(1);
        }
    };

    let code = match run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {err:?}");
            1
        }
    };

    tracing::info!("hxpolicy finished with exit code {}", code);
    // Flush buffered log lines before exiting
    drop(log_guard);
    std::process::exit(code);
}

async fn run(args: Args) -> Result<i32> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(policies) = args.policies {
        config.policies = Some(policies);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }

    match args.command.unwrap_or(Command::Apply) {
        Command::ListPolicies => {
            for (index, spec) in resolve_policies(&config)?.iter().enumerate() {
                println!("{}\t{}", spec.path, indexed_label(index, spec));
            }
            Ok(0)
        }
        Command::Apply => {
            let specs = resolve_policies(&config)?;
            let client = build_client(&config)?;
            let alerter = build_alerter(&config);
            let workflow = Run {
                client: &client,
                alerter: &alerter,
                context: &config.account,
                attachments: &config.attachments,
            };
            let (status, report) = workflow.provision(&specs, config.concurrency).await;
            if let Some(report) = report {
                println!(
                    "{} of {} policies created",
                    report.succeeded(),
                    report.total()
                );
                for label in report.failures() {
                    println!("failed: {}", label);
                }
            } else {
                println!("Availability check failed; no policies were submitted");
            }
            Ok(status.exit_code())
        }
        Command::Check => {
            let client = build_client(&config)?;
            let alerter = build_alerter(&config);
            let workflow = Run {
                client: &client,
                alerter: &alerter,
                context: &config.account,
                attachments: &config.attachments,
            };
            if workflow.check().await.passed() {
                println!("Availability check passed");
                Ok(RunStatus::Completed.exit_code())
            } else {
                println!("Availability check failed");
                Ok(RunStatus::GateFailed.exit_code())
            }
        }
        Command::Get { path, id } => {
            let client = build_client(&config)?;
            let path = ResourcePath::new(path);
            let value = match id {
                Some(id) => client.get_by_id(&path, &ObjectId::new(id)).await,
                None => client.get_collection(&path).await,
            };
            match value {
                Some(value) => {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                    Ok(0)
                }
                None => {
                    eprintln!("Unable to read '{}'; see the log for details", path);
                    Ok(1)
                }
            }
        }
        Command::Delete { path, id } => {
            let client = build_client(&config)?;
            let outcome = client
                .delete(&ResourcePath::new(path), &ObjectId::new(id))
                .await;
            println!("{}", outcome);
            Ok(if outcome == Outcome::Success { 0 } else { 1 })
        }
    }
}

fn resolve_policies(config: &Config) -> Result<Vec<PolicySpec>> {
    match &config.policies {
        Some(path) => load_policies(path),
        None => Ok(default_policies().to_vec()),
    }
}

fn build_client(config: &Config) -> Result<ResourceClient> {
    let provider: Arc<dyn TokenProvider> = match config.token_source(std::env::var(TOKEN_ENV).ok()) {
        Some(TokenSource::Literal(token)) => Arc::new(StaticToken::new(token)),
        Some(TokenSource::File(path)) => Arc::new(FileToken::new(path)),
        None => anyhow::bail!(
            "No API token configured. Set {} or token/token_file in the configuration file",
            TOKEN_ENV
        ),
    };

    let http = HttpClient::new(config.connect_timeout(), config.request_timeout())?;
    ResourceClient::new(&config.endpoint, Credentials::new(provider), http)
}

fn build_alerter(config: &Config) -> Alerter {
    let alert = &config.alert;
    let relay = SmtpRelay {
        host: alert.smtp_host.clone(),
        port: alert.smtp_port,
        helo_name: alert.helo_name.clone(),
        timeout: alert.timeout(),
    };
    Alerter::for_relay(relay, &alert.sender, alert.recipients.clone())
}
