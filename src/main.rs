use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ebilling::config::{default_config_path, ResolvedConfig};
use ebilling::duration::format_duration;
use ebilling::engine::SubmissionService;
use ebilling::models::{ConsumerKey, InvoiceTotals, SubmissionJob, SubmissionRequest};
use ebilling::session::{parse_exported_session, PortalSession, SessionCache};

#[derive(Parser)]
#[command(name = "ebilling")]
#[command(about = "Enter day/unit calendars on the DDS eBilling portal over HTTP")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,

    /// Manage captured portal sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Enter units for one consumer line and print the outcome
    Submit(SubmitArgs),

    /// Run every job in a JSON file on one session and print the reports
    Batch {
        /// Cached session name
        #[arg(long)]
        session: String,

        /// JSON array of jobs
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Store cookies exported from a logged-in browser
    Import {
        #[arg(long)]
        name: String,

        #[arg(long)]
        file: PathBuf,
    },

    /// Forget a stored session
    Delete {
        #[arg(long)]
        name: String,
    },
}

#[derive(Args)]
struct SubmitArgs {
    /// Cached session name
    #[arg(long)]
    session: String,

    /// Service provider number
    #[arg(long)]
    provider: String,

    #[arg(long)]
    invoice: String,

    /// Consumer UCI
    #[arg(long)]
    uci: String,

    #[arg(long)]
    subcode: Option<String>,

    /// Authorization number
    #[arg(long)]
    auth: Option<String>,

    /// Units for a day, as DAY=UNITS (repeatable), e.g. --day 11=1
    #[arg(long = "day", value_name = "DAY=UNITS", value_parser = parse_day_units, required = true)]
    days: Vec<(u8, Decimal)>,

    /// Invoice total units to compare with the portal
    #[arg(long, requires = "invoice_amount")]
    invoice_units: Option<Decimal>,

    /// Invoice total amount to compare with the portal
    #[arg(long, requires = "invoice_units")]
    invoice_amount: Option<Decimal>,
}

fn parse_day_units(s: &str) -> Result<(u8, Decimal), String> {
    let (day, units) = s
        .split_once('=')
        .ok_or_else(|| format!("expected DAY=UNITS, got {s:?}"))?;
    let day = day
        .trim()
        .parse()
        .map_err(|e| format!("invalid day {day:?}: {e}"))?;
    let units = units
        .trim()
        .parse()
        .map_err(|e| format!("invalid units {units:?}: {e}"))?;
    Ok((day, units))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

fn load_session(config: &ResolvedConfig, name: &str) -> Result<PortalSession> {
    let cache = SessionCache::with_path(&config.session_dir)?;
    let data = cache
        .get(name)?
        .with_context(|| format!("No cached session named {name:?}; run `ebilling session import` first"))?;
    PortalSession::new(name, config, &data)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;

    match cli.command {
        Command::Config => {
            println!("Config file: {}", cli.config.display());
            println!("Portal: {}", config.base_url);
            println!("Session directory: {}", config.session_dir.display());
            println!("HTTP timeout: {}", format_duration(config.http.timeout));
            println!(
                "Retry: {} attempts, initial backoff {}",
                config.retry.max_attempts,
                format_duration(config.retry.initial_backoff)
            );
            println!("Render calendar: {}", config.endpoints.calendar_render);
            println!("Persist calendar: {}", config.endpoints.calendar_persist);
        }
        Command::Session(SessionCommand::Import { name, file }) => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let data = parse_exported_session(&json)?;
            let cache = SessionCache::with_path(&config.session_dir)?;
            cache.set(&name, &data)?;
            tracing::info!(session = %name, cookies = data.cookies.len(), "Stored session");
        }
        Command::Session(SessionCommand::Delete { name }) => {
            SessionCache::with_path(&config.session_dir)?.delete(&name)?;
            tracing::info!(session = %name, "Deleted session");
        }
        Command::Submit(args) => {
            let session = load_session(&config, &args.session)?;
            let mut request = SubmissionRequest::new(args.days.into_iter().collect::<BTreeMap<_, _>>())?;
            if let (Some(units), Some(amount)) = (args.invoice_units, args.invoice_amount) {
                request = request.with_invoice_totals(InvoiceTotals { units, amount });
            }
            let mut consumer = ConsumerKey::new(args.uci);
            consumer.subcode = args.subcode;
            consumer.auth_number = args.auth;

            let job = SubmissionJob {
                provider_code: args.provider,
                invoice_id: args.invoice,
                consumer,
                request,
            };
            let service = SubmissionService::from_config(&config)?;
            let outcome = service.submit(&session, &job).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Batch { session, file } => {
            let session = load_session(&config, &session)?;
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let jobs: Vec<SubmissionJob> = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse jobs from {}", file.display()))?;

            let service = SubmissionService::from_config(&config)?;
            let reports = service.submit_batch(&session, jobs).await;
            println!("{}", serde_json::to_string_pretty(&reports)?);

            let failed = reports.iter().filter(|r| !r.result.is_submitted()).count();
            if failed > 0 {
                anyhow::bail!("{failed} of {} jobs were not submitted", reports.len());
            }
        }
    }

    Ok(())
}
