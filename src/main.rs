//! # Job Outreach CLI
//!
//! Command-line interface for the job outreach library (`job_outreach_core`).
//! This binary parses arguments, builds the configuration, wires the pipeline,
//! and runs it once or on a cron schedule until interrupted.

use job_outreach_core::{
    build_orchestrator, check_smtp_connectivity, create_resolver, Config, ConfigBuilder,
    DnsChecker, PipelineOrchestrator, RecordKind, ResolverDnsChecker, RunExit, RunSummary,
};

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use clap::Parser;
use cron::Schedule;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Finds job postings and sends one application email per posting.",
    long_about = "Job Outreach fetches postings, skips the ones already contacted, guesses a contact address for each organization from its domain, and sends a paced application email with your CV attached."
)]
struct AppArgs {
    /// Path to a configuration file (TOML format). CLI args override file settings.
    #[arg(long, env = "JOB_OUTREACH_CONFIG")]
    config_file: Option<String>,

    /// Listing source: an http(s) URL or a path to a JSON file of postings.
    #[arg(short, long, env = "JOB_OUTREACH_QUERY")]
    query: Option<String>,

    /// Run the pipeline once and exit instead of following the schedule.
    #[arg(long, env = "JOB_OUTREACH_ONCE")]
    once: bool,

    /// Log messages instead of sending them; the sent log is not written.
    #[arg(long, env = "JOB_OUTREACH_DRY_RUN")]
    dry_run: bool,

    /// Check DNS, SMTP login, attachment and credentials, then exit.
    #[arg(long)]
    check: bool,

    /// Maximum number of postings taken from the source per run.
    #[arg(long, env = "JOB_OUTREACH_MAX_POSTINGS")]
    max_postings: Option<usize>,

    /// Path of the CSV sent log used for deduplication.
    #[arg(long, env = "JOB_OUTREACH_SENT_LOG")]
    sent_log: Option<String>,

    /// File attached to every message. Pass an empty value to send without one.
    #[arg(long, env = "JOB_OUTREACH_ATTACHMENT")]
    attachment: Option<String>,

    /// Also write logs to this file (defaults to job_application.log when given without a value).
    #[arg(long, num_args = 0..=1, default_missing_value = "job_application.log", env = "JOB_OUTREACH_LOG_FILE")]
    log_file: Option<String>,

    /// SMTP login and default sender address.
    #[arg(long, env = "EMAIL_ADDRESS", hide_env_values = true)]
    email_address: Option<String>,

    /// SMTP app password.
    #[arg(long, env = "EMAIL_APP_PASSWORD", hide_env_values = true)]
    email_app_password: Option<String>,

    /// API key for the person lookup service used to verify top candidates.
    #[arg(long, env = "CLEARBIT_API_KEY", hide_env_values = true)]
    clearbit_api_key: Option<String>,
}

fn init_tracing(log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).compact())
        .with(file_layer)
        .try_init()
        .context("Setting up tracing subscriber failed")?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = AppArgs::parse();
    let _log_guard = init_tracing(args.log_file.as_deref())?;

    tracing::info!("Job Outreach CLI v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Parsed CLI arguments: {:?}", args);

    let config = build_config(&args)?;
    tracing::debug!("Effective configuration loaded: {:?}", config);

    if args.check {
        return run_preflight(&config).await;
    }

    let mut orchestrator = build_orchestrator(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize pipeline: {}", e))?;

    let shutdown = orchestrator.shutdown_token();
    cancel_on_ctrl_c(shutdown.clone());

    let result = if args.once || !config.schedule_enabled {
        run_once(&mut orchestrator).await
    } else {
        run_scheduled(&mut orchestrator, &config.schedule_cron, &shutdown).await
    };

    orchestrator.shutdown().await;
    tracing::info!("Job Outreach stopped.");
    result
}

fn build_config(args: &AppArgs) -> Result<Config> {
    let mut builder = ConfigBuilder::new();

    if let Some(ref path) = args.config_file {
        builder = builder.config_file(path);
    }
    if args.check {
        builder = builder.skip_query_check(true);
    }
    if let Some(ref q) = args.query {
        builder = builder.search_query(q);
    }
    if args.dry_run {
        builder = builder.dry_run(true);
    }
    if args.once {
        builder = builder.schedule_enabled(false);
    }
    if let Some(n) = args.max_postings {
        builder = builder.max_postings_per_run(n);
    }
    if let Some(ref path) = args.sent_log {
        builder = builder.sent_log_path(path);
    }
    if let Some(ref path) = args.attachment {
        builder = builder.attachment_path(path);
    }
    if let (Some(user), Some(pass)) = (&args.email_address, &args.email_app_password) {
        builder = builder.smtp_credentials(user, pass);
    }
    if let Some(ref key) = args.clearbit_api_key {
        builder = builder.verification_api_key(key);
    }

    builder.build().map_err(|e| {
        tracing::error!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to build configuration: {}", e)
    })
}

fn log_summary(summary: &RunSummary) {
    match summary.exit {
        RunExit::Completed => tracing::info!(
            "Run complete: {} sent, {} failed ({} fetched, {} new, {} with contacts)",
            summary.sent, summary.failed, summary.fetched, summary.new_postings, summary.resolved
        ),
        RunExit::NoPostings => tracing::info!("Run ended: no postings found."),
        RunExit::NoNewPostings => tracing::info!("Run ended: all {} postings were already contacted.", summary.fetched),
        RunExit::NoResolvedPostings => tracing::info!(
            "Run ended: none of {} new postings had a reachable contact domain.", summary.new_postings
        ),
        RunExit::FetchFailed => tracing::warn!("Run ended: listing source unavailable; will retry next run."),
        RunExit::Interrupted => tracing::info!(
            "Run interrupted: {} sent and recorded before stopping.", summary.sent
        ),
        RunExit::Aborted => tracing::error!("Run aborted unexpectedly; see errors above."),
    }
}

/// Cancels `shutdown` on the first Ctrl+C. The running pipeline observes it
/// between sends, so a delivery in progress is always recorded.
fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, finishing the current send before stopping...");
            shutdown.cancel();
        }
    });
}

async fn run_once(orchestrator: &mut PipelineOrchestrator) -> Result<()> {
    let summary = orchestrator.run().await;
    log_summary(&summary);
    match summary.exit {
        RunExit::FetchFailed | RunExit::Aborted => {
            Err(anyhow::anyhow!("Run did not complete: {:?}", summary.exit))
        }
        _ => Ok(()),
    }
}

async fn run_scheduled(
    orchestrator: &mut PipelineOrchestrator,
    expression: &str,
    shutdown: &CancellationToken,
) -> Result<()> {
    let schedule = Schedule::from_str(expression)
        .with_context(|| format!("Invalid cron expression '{}'", expression))?;
    let mut budget_month = Local::now().month();

    tracing::info!("Scheduler started ({}); running immediately.", expression);

    loop {
        let month = Local::now().month();
        if month != budget_month {
            orchestrator.resolver_mut().reset_verification_budget();
            budget_month = month;
        }

        let summary = orchestrator.run().await;
        log_summary(&summary);
        if shutdown.is_cancelled() {
            tracing::info!("Shutting down scheduler...");
            return Ok(());
        }

        let next = schedule
            .upcoming(Local)
            .next()
            .context("Cron schedule has no upcoming fire time")?;
        let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
        tracing::info!("Next run scheduled for {} (in {:?})", next, wait);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.cancelled() => {
                tracing::info!("Shutting down scheduler...");
                return Ok(());
            }
        }
    }
}

async fn run_preflight(config: &Config) -> Result<()> {
    println!("Job Outreach preflight check");
    println!("============================");
    let mut failures = 0usize;
    let mut report = |name: &str, passed: bool, detail: String| {
        let mark = if passed { "PASS" } else { "FAIL" };
        println!("[{}] {}: {}", mark, name, detail);
        if !passed {
            failures += 1;
        }
    };

    match create_resolver(config) {
        Ok(resolver) => {
            let dns = ResolverDnsChecker::new(resolver);
            match dns.exists("gmail.com", RecordKind::Mx).await {
                Ok(true) => report("DNS", true, "gmail.com has MX records".to_string()),
                Ok(false) => report("DNS", false, "gmail.com returned no MX records".to_string()),
                Err(e) => report("DNS", false, e.to_string()),
            }
        }
        Err(e) => report("DNS", false, e.to_string()),
    }

    if config.dry_run {
        report("SMTP", true, "skipped in dry-run mode".to_string());
    } else {
        match check_smtp_connectivity(config).await {
            Ok(()) => report(
                "SMTP",
                true,
                format!("logged in to {}:{}", config.smtp_host, config.smtp_port),
            ),
            Err(e) => report("SMTP", false, e.to_string()),
        }
    }

    match &config.attachment_path {
        Some(path) if path.exists() => report("Attachment", true, path.display().to_string()),
        Some(path) => report("Attachment", false, format!("{} not found", path.display())),
        None => report("Attachment", true, "disabled".to_string()),
    }

    match config.search_query.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => report("Listing query", true, q.to_string()),
        _ => report("Listing query", false, "not configured".to_string()),
    }

    let has_key = config
        .verification_api_key
        .as_ref()
        .map(|k| !k.is_empty())
        .unwrap_or(false);
    report(
        "Verification API key",
        true,
        if has_key {
            format!("configured (budget {} calls)", config.verification_monthly_budget)
        } else {
            "not set; candidates will stay unverified".to_string()
        },
    );

    println!();
    if failures == 0 {
        println!("All checks passed.");
        Ok(())
    } else {
        println!("{} check(s) failed.", failures);
        Err(anyhow::anyhow!("Preflight failed with {} failing check(s)", failures))
    }
}
