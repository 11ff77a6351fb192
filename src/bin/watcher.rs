//! CLI binary for aw-watcher-ask.

use aw_watcher_ask::{
    EventRecorder, QuestionDescriptor, RecorderConfig, Watcher, WatcherConfig, ZenitySurface,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Periodically ask the user a question and record the answer in
/// ActivityWatch.
#[derive(Parser)]
#[command(name = "aw-watcher-ask", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging output.
    #[arg(short, long)]
    verbose: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Ask the question on its schedule and record the answers (default).
    Run(RunArgs),

    /// Write a starter configuration file and exit.
    Init,
}

/// Flag overrides applied on top of the configuration file.
#[derive(Args, Default)]
struct RunArgs {
    /// Question identifier (lower-case letters, digits and dots).
    #[arg(long)]
    question_id: Option<String>,

    /// Dialog kind: entry, confirmation, choice, scale, password, calendar.
    #[arg(long)]
    question_type: Option<String>,

    /// Dialog title. Defaults to the question id.
    #[arg(long)]
    title: Option<String>,

    /// Dialog body text.
    #[arg(long)]
    text: Option<String>,

    /// Six-field cron expression, seconds first. `R` in the second,
    /// minute or hour field picks a random in-range value at startup.
    #[arg(long)]
    schedule: Option<String>,

    /// Stop prompting at this date and time (RFC 3339 or `YYYY-MM-DD`).
    #[arg(long)]
    until: Option<String>,

    /// Seconds to wait for an answer before the prompt times out.
    #[arg(long)]
    timeout: Option<u64>,

    /// Record to the isolated testing namespace (and testing server port).
    #[arg(long)]
    testing: bool,

    /// An option presented by choice questions (repeatable).
    #[arg(long)]
    choice: Vec<String>,

    /// Scale lower bound.
    #[arg(long)]
    min: Option<i64>,

    /// Scale upper bound.
    #[arg(long)]
    max: Option<i64>,

    /// Scale step.
    #[arg(long)]
    step: Option<i64>,

    /// Scale initial value.
    #[arg(long)]
    default: Option<i64>,

    /// Expected answer format for calendar questions (strftime-style).
    #[arg(long)]
    date_format: Option<String>,

    /// ActivityWatch server host.
    #[arg(long)]
    host: Option<String>,

    /// ActivityWatch server port.
    #[arg(long)]
    port: Option<u16>,

    /// Dialog program to invoke instead of zenity.
    #[arg(long)]
    surface_binary: Option<String>,

    /// Extra flag passed straight to the prompting surface (repeatable).
    #[arg(long = "extra", value_name = "KEY[=VALUE]")]
    extra: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Keep dependency logs quiet unless RUST_LOG says otherwise.
    // Users can override with RUST_LOG=debug to see everything.
    let default_filter = if cli.verbose {
        "aw_watcher_ask=debug"
    } else {
        "aw_watcher_ask=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(args) => run_watcher(cli.config, args).await,
        Command::Init => init_config(cli.config),
    }
}

async fn run_watcher(config_path: Option<PathBuf>, args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, args);

    // Construction-time validation: a bad id, kind, schedule, or option
    // set exits non-zero here, before anything is scheduled.
    let question = QuestionDescriptor::from_config(&config)?;

    let surface = ZenitySurface::new(&config.surface);
    if !surface.is_available() {
        tracing::warn!(
            binary = surface.binary(),
            "prompting surface not found in PATH, prompts will fail until it is installed"
        );
    }

    let recorder = EventRecorder::new(
        RecorderConfig::from_server(&config.server, question.testing())
            .with_event_type(question.id()),
    );
    info!(
        server = %recorder.config().base_url,
        bucket = %recorder.bucket_id(),
        "recording to server"
    );

    let mut watcher = Watcher::new(question, Arc::new(surface), recorder);

    // Handle Ctrl+C
    let cancel = watcher.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel.cancel();
        }
    });

    watcher.run().await?;
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<WatcherConfig> {
    match path {
        Some(path) => Ok(WatcherConfig::from_file(&path)?),
        None => {
            let path = WatcherConfig::default_config_path();
            if path.exists() {
                Ok(WatcherConfig::from_file(&path)?)
            } else {
                Ok(WatcherConfig::default())
            }
        }
    }
}

fn apply_overrides(config: &mut WatcherConfig, args: RunArgs) {
    let question = &mut config.question;
    if let Some(id) = args.question_id {
        question.id = id;
    }
    if let Some(kind) = args.question_type {
        question.kind = kind;
    }
    if let Some(title) = args.title {
        question.title = Some(title);
    }
    if let Some(text) = args.text {
        question.text = Some(text);
    }
    if let Some(schedule) = args.schedule {
        question.schedule = schedule;
    }
    if let Some(until) = args.until {
        question.until = Some(until);
    }
    if let Some(timeout) = args.timeout {
        question.timeout_seconds = timeout;
    }
    if args.testing {
        question.testing = true;
    }
    if !args.choice.is_empty() {
        question.choices = args.choice;
    }
    if let Some(min) = args.min {
        question.min = Some(min);
    }
    if let Some(max) = args.max {
        question.max = Some(max);
    }
    if let Some(step) = args.step {
        question.step = Some(step);
    }
    if let Some(default) = args.default {
        question.default = Some(default);
    }
    if let Some(date_format) = args.date_format {
        question.date_format = Some(date_format);
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = Some(port);
    }
    if let Some(binary) = args.surface_binary {
        config.surface.binary = binary;
    }
    for entry in args.extra {
        let (key, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
        config
            .surface
            .extra
            .insert(key.trim_start_matches('-').to_owned(), value.to_owned());
    }
}

/// Starter configuration written by `init`. Kept as a literal so the file
/// carries comments; it must stay parseable as a [`WatcherConfig`].
const STARTER_CONFIG: &str = r#"# aw-watcher-ask configuration.
# The watcher asks one question on a cron schedule and records every
# answer as an event in ActivityWatch.

[question]
# Identifier for all events produced by this question
# (lower-case letters, digits, and dots).
id = "my.question"
# One of: entry, confirmation, choice, scale, password, calendar.
type = "confirmation"
text = "What are you working on?"
# Six fields: second minute hour day-of-month month day-of-week.
# R picks a random in-range value at startup (here: a random minute).
schedule = "0 R * * * *"
# Seconds to wait for an answer before the prompt times out.
timeout_seconds = 60

[server]
host = "127.0.0.1"
# port = 5600

[surface]
binary = "zenity"

# Extra flags passed straight through to the dialog program:
# [surface.extra]
# width = "480"
"#;

fn init_config(path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(WatcherConfig::default_config_path);
    if path.exists() {
        anyhow::bail!("refusing to overwrite existing config at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, STARTER_CONFIG)?;

    println!("Wrote starter configuration to {}", path.display());
    Ok(())
}
