//! kpitree CLI: publish a dated KPI tree report and maintain the calendar index.
//!
//! Commands:
//! - `kpitree <DATE>`: full run (query, refresh, generate, verify, publish, calendar)
//! - `render-query <DATE>`: print the parameterized query from the local template
//! - `calendar show` / `calendar add <DATE>`: inspect or update the calendar index
//! - `paths <DATE>`: print the publication locations for a date

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use kpitree_core::collab::{AutoGate, HumanGate};
use kpitree_core::date::{DateStrictness, TargetDate};
use kpitree_core::paths::PublicationPaths;
use kpitree_core::query::{parameterize, ParamStatus};
use kpitree_runner::setup::{self, Collaborators};
use kpitree_runner::{
    CalendarIndexUpdater, CalendarUpdate, DeploymentContext, PublishConfig, RepublishStatus,
    RunMode, RunSummary, StdinGate, Workflow,
};

#[derive(Parser)]
#[command(
    name = "kpitree",
    about = "Publish the daily KPI tree report and keep the calendar index current",
    subcommand_negates_reqs = true
)]
struct Cli {
    /// Target date (YYYY-MM-DD).
    #[arg(required = true)]
    date: Option<String>,

    /// Execution mode: interactive or unattended.
    #[arg(long, default_value = "interactive")]
    mode: RunMode,

    /// Path to a TOML config file. Defaults to <root>/kpitree.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Deployment root. Defaults to /app inside a container, else the working directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Also publish the "today" alias.
    #[arg(long, default_value_t = false)]
    today: bool,

    /// Reject dates that are well-formed but not real calendar dates.
    #[arg(long, default_value_t = false)]
    strict_date: bool,

    /// Write the run summary as JSON to this path.
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the parameterized query from the configured template.
    RenderQuery {
        /// Target date (YYYY-MM-DD).
        date: String,
    },
    /// Calendar index commands.
    Calendar {
        #[command(subcommand)]
        action: CalendarAction,
    },
    /// Print the publication locations for a date.
    Paths {
        /// Target date (YYYY-MM-DD).
        date: String,
    },
}

#[derive(Subcommand)]
enum CalendarAction {
    /// Print the dates in the local calendar index.
    Show,
    /// Add a date to the calendar index and republish it.
    Add {
        /// Target date (YYYY-MM-DD).
        date: String,

        /// Update the local index only.
        #[arg(long, default_value_t = false)]
        no_republish: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let ctx = match &cli.root {
        Some(root) => DeploymentContext::at(root),
        None => DeploymentContext::detect(),
    };
    let config = PublishConfig::load(cli.config.as_deref(), &ctx.default_config_path())
        .context("failed to load configuration")?;
    info!(root = %ctx.root().display(), kind = ?ctx.kind(), "deployment context");

    match &cli.command {
        Some(Commands::RenderQuery { date }) => run_render_query(&cli, &ctx, &config, date),
        Some(Commands::Calendar { action }) => match action {
            CalendarAction::Show => run_calendar_show(&ctx, &config),
            CalendarAction::Add { date, no_republish } => {
                run_calendar_add(&cli, &ctx, &config, date, *no_republish)
            }
        },
        Some(Commands::Paths { date }) => run_paths(&cli, &config, date),
        None => {
            let Some(date) = cli.date.as_deref() else {
                bail!("a target date (YYYY-MM-DD) is required");
            };
            let code = run_publish(&cli, &ctx, &config, date)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
    }
}

/// Logs go to stderr so the summary on stdout stays clean.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn strictness(cli: &Cli, config: &PublishConfig) -> DateStrictness {
    if cli.strict_date {
        DateStrictness::Calendar
    } else {
        config.query.strictness()
    }
}

fn parse_date(cli: &Cli, config: &PublishConfig, raw: &str) -> Result<TargetDate> {
    TargetDate::parse_with(raw, strictness(cli, config)).with_context(|| format!("bad date '{raw}'"))
}

fn run_publish(cli: &Cli, ctx: &DeploymentContext, config: &PublishConfig, date: &str) -> Result<i32> {
    let collaborators = Collaborators::from_config(config, ctx)?;
    let policy = setup::policy(config, cli.mode);
    let settings = setup::workflow_settings(config, ctx, cli.today, cli.strict_date);

    let gate: Box<dyn HumanGate> = match policy.mode {
        RunMode::Interactive => Box::new(StdinGate::new()),
        RunMode::Unattended => Box::new(AutoGate::approve()),
    };

    let workflow = Workflow::new(
        collaborators.query_store.as_ref(),
        &collaborators.generator,
        collaborators.object_store.as_ref(),
        gate.as_ref(),
        policy,
        settings,
    );
    let summary = workflow.run(date);

    print!("{}", summary.render_table());
    if let Some(path) = &cli.summary_json {
        write_summary_json(&summary, path)?;
    }
    Ok(summary.exit_code())
}

fn write_summary_json(summary: &RunSummary, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Summary written to: {}", path.display());
    Ok(())
}

fn run_render_query(cli: &Cli, ctx: &DeploymentContext, config: &PublishConfig, raw: &str) -> Result<()> {
    let date = parse_date(cli, config, raw)?;
    let template_path = ctx.resolve(&config.query.template);
    let template = std::fs::read_to_string(&template_path)
        .with_context(|| format!("failed to read query template {}", template_path.display()))?;

    let result = parameterize(&template, &date);
    if result.status == ParamStatus::TemplateNotMatched {
        eprintln!(
            "warning: no `SET target_date = DATE '...';` statement in {}; printed unchanged",
            template_path.display()
        );
    }
    print!("{}", result.text);
    if !result.text.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn run_calendar_show(ctx: &DeploymentContext, config: &PublishConfig) -> Result<()> {
    let index_path = ctx.resolve(&config.calendar.index);
    let index = CalendarIndexUpdater::local_only(&index_path, "read only").load()?;

    println!("Calendar index: {}", index_path.display());
    for repair in index.repairs() {
        println!("  (would repair: {repair})");
    }
    println!("Dates: {}", index.len());
    for date in index.dates() {
        println!("  {date}");
    }
    Ok(())
}

fn run_calendar_add(
    cli: &Cli,
    ctx: &DeploymentContext,
    config: &PublishConfig,
    raw: &str,
    no_republish: bool,
) -> Result<()> {
    let date = parse_date(cli, config, raw)?;
    let index_path = ctx.resolve(&config.calendar.index);
    let policy = setup::policy(config, cli.mode);
    let store = setup::object_store(config, ctx);
    let paths = PublicationPaths::derive(&config.storage.base, &date, None);

    let updater = if no_republish {
        CalendarIndexUpdater::local_only(&index_path, "--no-republish")
    } else if !store.is_available() {
        CalendarIndexUpdater::local_only(
            &index_path,
            format!("storage client '{}' not available", store.name()),
        )
    } else {
        CalendarIndexUpdater::new(&index_path, store.as_ref(), paths.calendar)
    }
    .backup_failure(policy.calendar_backup_failure);

    let report = updater.update(&date)?;
    for repair in &report.repairs {
        println!("Repaired: {repair}");
    }
    match report.update {
        CalendarUpdate::AlreadyPresent => println!("{date} already present; index unchanged"),
        CalendarUpdate::Added { republish } => {
            println!("Added {date} ({} dates)", report.total_dates);
            match republish {
                RepublishStatus::Published => println!("Republished the calendar index"),
                RepublishStatus::Skipped(reason) => println!("Republish skipped: {reason}"),
                RepublishStatus::Failed(reason) => println!("Republish failed: {reason}"),
            }
        }
    }
    Ok(())
}

fn run_paths(cli: &Cli, config: &PublishConfig, raw: &str) -> Result<()> {
    let date = parse_date(cli, config, raw)?;
    let alias = cli.today.then_some(config.storage.today_alias.as_str());
    let paths = PublicationPaths::derive(&config.storage.base, &date, alias);

    let mut rows = vec![("latest", &paths.latest), ("archive", &paths.archive)];
    if let Some(alias) = &paths.alias {
        rows.push(("today", alias));
    }
    rows.push(("calendar", &paths.calendar));

    println!("{:<9} {:<50} {}", "Target", "URI", "Public URL");
    println!("{}", "-".repeat(100));
    for (label, uri) in rows {
        println!(
            "{:<9} {:<50} {}",
            label,
            uri.to_string(),
            uri.public_url().unwrap_or_default()
        );
    }
    Ok(())
}
