//! CLI command definitions, routing, and tracing setup.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use buildwatch_ci::CiClient;
use buildwatch_core::{ProgressReporter, RunOutcome, RunReport};
use buildwatch_logs::LogClient;
use buildwatch_notify::{NullMailer, SmtpMailer};
use buildwatch_shared::{AppConfig, BodyMode, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// buildwatch — email the log window of a failed CI build.
#[derive(Parser)]
#[command(
    name = "buildwatch",
    version,
    about = "Poll a CI project's latest build and email its failure logs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the notification pipeline once and exit.
    Run {
        /// Project name (overrides the config file).
        #[arg(short, long)]
        project: Option<String>,

        /// Output file path for the persisted log window (overrides config).
        #[arg(short, long)]
        output: Option<String>,

        /// Fetch and persist the log window but skip the email send.
        #[arg(long)]
        dry_run: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "buildwatch=info",
        1 => "buildwatch=debug",
        _ => "buildwatch=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Run {
            project,
            output,
            dry_run,
        } => cmd_run(project.as_deref(), output.as_deref(), dry_run).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(project: Option<&str>, output: Option<&str>, dry_run: bool) -> Result<ExitCode> {
    // Load config and apply CLI overrides
    let mut config: AppConfig = load_config()?;
    if let Some(name) = project {
        config.project.name = name.to_string();
    }
    if let Some(path) = output {
        config.output.path = path.to_string();
    }

    config.validate_for_run()?;
    if !dry_run {
        config.validate_for_send()?;
    }

    let ci = CiClient::new(&config.ci_endpoint(), config.service.timeout_secs)?;
    let logs = LogClient::new(
        &config.logs_endpoint(),
        config.service.timeout_secs,
        config.service.log_limit,
        config.service.max_retries,
    )?;

    info!(
        project = %config.project.name,
        output = %config.output.path,
        dry_run,
        "starting run"
    );

    let reporter = CliProgress::new();

    // The password is only resolved (and the transport only built) when the
    // send stage can actually be reached.
    let report = if dry_run {
        buildwatch_core::run(&config, &ci, &logs, &NullMailer, &reporter, true).await
    } else {
        let password = config.smtp_password()?;
        let mailer = SmtpMailer::new(
            &config.email,
            &password,
            config.service.timeout_secs,
            config.service.max_retries,
        )?;
        buildwatch_core::run(&config, &ci, &logs, &mailer, &reporter, false).await
    };

    print_summary(&config, &report);

    Ok(ExitCode::from(report.outcome.exit_code()))
}

/// Print the human summary plus the machine-readable status line.
fn print_summary(config: &AppConfig, report: &RunReport) {
    println!();
    println!("  Project:  {}", config.project.name);
    if let Some(id) = &report.build_id {
        println!("  Build:    {id}");
    }
    match report.outcome {
        RunOutcome::Sent => {
            println!("  Lines:    {}", report.line_count);
            if let Some(path) = &report.output_path {
                println!("  Report:   {}", path.display());
            }
            match config.email.body {
                BodyMode::Attach => println!("  Sent to:  {} (attached)", config.email.recipient),
                BodyMode::Inline => println!("  Sent to:  {} (inline)", config.email.recipient),
            }
        }
        RunOutcome::DryRun => {
            println!("  Lines:    {}", report.line_count);
            if let Some(path) = &report.output_path {
                println!("  Report:   {}", path.display());
            }
            println!("  Dry run:  email send skipped");
        }
        RunOutcome::NoBuild => println!("  No builds found."),
        RunOutcome::NoFailure => println!("  Latest build did not fail."),
        RunOutcome::NoLogs => println!("  No log lines to report."),
        RunOutcome::FetchError | RunOutcome::PersistError | RunOutcome::SendError => {
            if let Some(error) = &report.error {
                println!("  Error:    {error}");
            }
        }
    }
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    println!();
    println!("outcome={}", report.outcome);
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<ExitCode> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_config_show() -> Result<ExitCode> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)
        .map_err(|e| eyre!("cannot render config: {e}"))?;
    println!("{toml_str}");
    Ok(ExitCode::SUCCESS)
}
