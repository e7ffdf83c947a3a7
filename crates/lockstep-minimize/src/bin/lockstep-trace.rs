//! lockstep trace CLI: inspect schedules, mintraces and minimization reports

use clap::{Parser, Subcommand};
use lockstep_core::trace::load_dump;
use lockstep_core::{ScheduleStep, TraceBody, TraceDump, TraceParseError};
use lockstep_minimize::{format_report, format_report_markdown, load_report_json, SerializeError};
use lockstep_model::{EventTree, ModelError};
use snafu::Snafu;
use std::path::{Path, PathBuf};

/// CLI errors for the trace binary.
#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("Trace error: {source}"), context(false))]
    Trace { source: TraceParseError },
    #[snafu(display("Event tree error: {source}"), context(false))]
    Model { source: ModelError },
    #[snafu(display("Serialization error: {source}"), context(false))]
    Serialize { source: SerializeError },
    #[snafu(display("JSON error: {source}"), context(false))]
    Json { source: serde_json::Error },
    #[snafu(display("{message}"))]
    Other { message: String },
}

#[derive(Parser)]
#[command(name = "lockstep-trace")]
#[command(about = "Inspect lockstep schedule traces, mintraces and minimization reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show trace header and size
    Info {
        /// Path to trace file
        #[arg(short, long)]
        trace: PathBuf,
    },

    /// Print the event tree of a mintrace
    Tree {
        /// Path to mintrace file
        #[arg(short, long)]
        trace: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List the decisions of a schedule trace
    Schedule {
        /// Path to schedule trace file
        #[arg(short, long)]
        trace: PathBuf,

        /// Maximum number of decisions to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Check that a trace parses and, for a mintrace, that its tree is well formed
    Validate {
        /// Path to trace file
        #[arg(short, long)]
        trace: PathBuf,
    },

    /// Render a saved minimization report
    Report {
        /// Path to JSON report
        #[arg(short, long)]
        report: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: ReportFormat,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ReportFormat {
    Text,
    Markdown,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { trace } => cmd_info(&trace),
        Commands::Tree { trace, format } => cmd_tree(&trace, format),
        Commands::Schedule { trace, limit } => cmd_schedule(&trace, limit),
        Commands::Validate { trace } => cmd_validate(&trace),
        Commands::Report { report, format } => cmd_report(&report, format),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_info(path: &Path) -> Result<(), CliError> {
    let dump = load_dump(path)?;
    let meta = &dump.metadata;

    println!("Trace: {}", path.display());
    println!(
        "  Kind: {}",
        if meta.is_mintrace { "mintrace" } else { "schedule" }
    );
    if let Some(test) = &meta.test_method {
        println!("  Test method: {}", test);
    }
    println!("  Fair scheduling: {}", meta.fair_scheduling);
    println!("  Cycle detection: {}", meta.cycle_detection);
    if let Some(threshold) = meta.liveness_temperature_threshold {
        println!("  Liveness temperature threshold: {}", threshold);
    }
    println!("  Bug found: {}", meta.bug_found);
    if let Some(step) = meta.bug_step {
        println!("  Bug step: {}", step);
    }

    match &dump.body {
        TraceBody::Schedule(schedule) => {
            println!("  Decisions: {}", schedule.len());
            println!("  Scheduling choices: {}", schedule.scheduling_choices());
        }
        TraceBody::Mintrace(_) => {
            let tree = EventTree::from_mintrace(&dump)?;
            println!("  Steps: {}", tree.len());
            println!("  Scheduling steps: {}", tree.scheduling_steps());
            println!("  Withheld sends: {}", tree.withheld().len());
            if let Some(monitor) = tree.liveness_monitor() {
                println!("  Liveness monitor: {}", monitor);
            }
        }
    }
    Ok(())
}

fn cmd_tree(path: &Path, format: OutputFormat) -> Result<(), CliError> {
    let dump = load_dump(path)?;
    let tree = EventTree::from_mintrace(&dump)?;
    match format {
        OutputFormat::Text => print!("{}", tree),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(tree.steps())?),
    }
    Ok(())
}

fn cmd_schedule(path: &Path, limit: Option<usize>) -> Result<(), CliError> {
    let dump = load_dump(path)?;
    let schedule = match &dump.body {
        TraceBody::Schedule(schedule) => schedule,
        TraceBody::Mintrace(_) => {
            return OtherSnafu {
                message: format!("{} is a mintrace; use `tree` instead", path.display()),
            }
            .fail();
        }
    };

    let shown = limit.unwrap_or(usize::MAX);
    println!("{:<8} {:<12} VALUE", "STEP", "KIND");
    println!("{}", "-".repeat(40));
    for (i, step) in schedule.iter().take(shown).enumerate() {
        let (kind, value) = match step {
            ScheduleStep::SchedulingChoice(id) => ("schedule", id.to_string()),
            ScheduleStep::BooleanChoice(value) => ("bool", value.to_string()),
            ScheduleStep::FairBooleanChoice(uid, value) => ("fair-bool", format!("{} ({})", value, uid)),
            ScheduleStep::IntegerChoice(value) => ("int", value.to_string()),
        };
        println!("{:<8} {:<12} {}", i, kind, value);
    }
    if schedule.len() > shown {
        println!("... {} more", schedule.len() - shown);
    }
    Ok(())
}

fn cmd_validate(path: &Path) -> Result<(), CliError> {
    let dump: TraceDump = load_dump(path)?;
    match &dump.body {
        TraceBody::Schedule(schedule) => {
            println!("ok: schedule with {} decisions", schedule.len());
        }
        TraceBody::Mintrace(_) => {
            let tree = EventTree::from_mintrace(&dump)?;
            tree.validate()?;
            println!("ok: event tree with {} steps", tree.len());
        }
    }
    Ok(())
}

fn cmd_report(path: &Path, format: ReportFormat) -> Result<(), CliError> {
    let report = load_report_json(path)?;
    match format {
        ReportFormat::Text => print!("{}", format_report(&report)),
        ReportFormat::Markdown => print!("{}", format_report_markdown(&report)),
    }
    Ok(())
}
