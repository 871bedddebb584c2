//! sqlpilot: batch SQL transformation CLI
//!
//! # Usage
//!
//! ```bash
//! # Add comments to every .sql file under queries/, keeping backups
//! sqlpilot --task comment --path queries/ --recursive --backup
//!
//! # Preview a refactor without touching the file
//! sqlpilot --task refactor --path report.sql --dry-run
//!
//! # Generate SQL from a question file
//! sqlpilot --task nl-to-sql --path question.txt --schema schema.json --output answer.sql
//! ```

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use colored::*;
use sqlpilot::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlpilot")]
#[command(version)]
#[command(about = "Batch SQL transformation through completion tasks", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlpilot --task comment --path queries/ --recursive --backup
    sqlpilot --task refactor --path report.sql --dry-run
    sqlpilot --task mask --path exports/ --detect-only --dry-run
    sqlpilot --task nl-to-sql --path question.txt --schema schema.json --output answer.sql")]
struct Cli {
    /// Task to perform (see `sqlpilot tasks`)
    #[arg(short, long)]
    task: Option<String>,

    /// SQL file or directory path
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Recursively process folders
    #[arg(short, long)]
    recursive: bool,

    /// Backup files before modifying
    #[arg(short, long)]
    backup: bool,

    /// Preview changes without saving
    #[arg(short, long)]
    dry_run: bool,

    /// Clean output to remove markdown and explanations
    #[arg(long)]
    sanitize: bool,

    /// Mask sensitive literals in the final output
    #[arg(long)]
    mask_output: bool,

    /// Write output to a separate file (or directory for a folder path)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stage modified files to Git
    #[arg(long)]
    git: bool,

    /// SQL dialect for style-enforce and nl-to-sql
    #[arg(long, default_value = "generic")]
    dialect: String,

    /// JSON schema file for nl-to-sql
    #[arg(long, default_value = "schema.json")]
    schema: PathBuf,

    /// Report sensitive data instead of masking it (mask task)
    #[arg(long)]
    detect_only: bool,

    /// Config file (defaults to ./sqlpilot.toml, then the user config dir)
    #[arg(long, env = "SQLPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available tasks
    Tasks,
    /// List prompt templates and their required inputs
    Prompts,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_env("SQLPILOT_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Some(Commands::Tasks) => {
            show_tasks();
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Prompts) => {
            let config = Config::load(cli.config.as_deref())?;
            show_prompts(&TemplateIndex::open_or_bundled(config.prompts_dir.as_deref())?);
            return Ok(ExitCode::SUCCESS);
        }
        None => {}
    }

    let (Some(task_name), Some(path)) = (&cli.task, &cli.path) else {
        println!("{}", "sqlpilot: batch SQL transformation".cyan().bold());
        println!();
        println!("Usage: sqlpilot --task <TASK> --path <PATH> [OPTIONS]");
        println!();
        println!("Try: sqlpilot --help");
        return Ok(ExitCode::SUCCESS);
    };

    let kind: TaskKind = task_name.parse()?;
    if cli.detect_only && kind != TaskKind::Mask {
        bail!("--detect-only only applies to the mask task");
    }

    let config = Config::load(cli.config.as_deref())?;
    let templates = Arc::new(
        TemplateIndex::open_or_bundled(config.prompts_dir.as_deref())
            .context("loading prompt templates")?,
    );
    let client: Arc<dyn CompletionClient> = Arc::new(AzureOpenAiClient::new(&config)?);

    let params = TaskParams {
        dialect: cli.dialect.clone(),
        schema_path: cli.schema.clone(),
        detect_only: cli.detect_only,
    };
    let task = Task::new(kind, templates, client, &params)
        .with_context(|| format!("cannot start task '{}'", kind))?;

    let options = BatchOptions {
        recursive: cli.recursive,
        backup: cli.backup,
        dry_run: cli.dry_run,
        sanitize: cli.sanitize,
        mask_output: cli.mask_output,
        output: cli.output.clone(),
        stage: cli.git,
    };

    let report = Orchestrator::new(task, params, options).run(path).await;
    print_report(&report);

    Ok(if report.failed() > 0 {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

fn print_report(report: &BatchReport) {
    for dir in &report.unreadable {
        println!(
            "{} {} {}",
            "⚠".yellow(),
            "Skipped unreadable directory:".yellow(),
            dir.display()
        );
    }
    if let Some(notice) = &report.notice {
        println!("{} {}", "⚠".yellow(), notice.yellow());
        return;
    }

    for outcome in &report.outcomes {
        let path = outcome.path.display().to_string();
        match &outcome.result {
            Ok(JobStatus::DryRun { output }) => {
                println!("{} {}", "Dry run output:".green().bold(), path.cyan());
                println!("{}", "─".repeat(60).dimmed());
                println!("{}", output);
                println!("{}", "─".repeat(60).dimmed());
            }
            Ok(JobStatus::Written {
                destination,
                backup,
                staged,
            }) => {
                if let Some(backup) = backup {
                    println!("{} Backup created: {}", "🔒".dimmed(), backup.display());
                }
                println!("{} Updated: {}", "✓".green(), destination.display());
                if *staged {
                    println!("{} Git staged: {}", "✓".green(), destination.display());
                }
            }
            Err(e) => {
                let label = match e.kind() {
                    ErrorKind::Filesystem => "✗ WRITE FAILED".red().bold(),
                    _ => "✗".red(),
                };
                println!(
                    "{} [{}] {} ({}): {}",
                    label,
                    report.task.to_string().yellow(),
                    path.cyan(),
                    e.kind(),
                    e
                );
            }
        }
    }

    println!();
    println!(
        "{} succeeded, {} failed",
        report.succeeded().to_string().green().bold(),
        if report.failed() > 0 {
            report.failed().to_string().red().bold()
        } else {
            report.failed().to_string().normal()
        }
    );
    if !report.unreadable.is_empty() {
        println!(
            "{} directories could not be read; files under them were not processed",
            report.unreadable.len().to_string().yellow().bold()
        );
    }
}

fn show_tasks() {
    println!("{}", "sqlpilot tasks".cyan().bold());
    println!();
    for kind in TaskKind::ALL {
        println!(
            "  {:20} {}",
            kind.name().yellow(),
            kind.description().white()
        );
    }
}

fn show_prompts(index: &TemplateIndex) {
    println!(
        "{} {}",
        "Prompt templates in".cyan().bold(),
        index.root().display()
    );
    println!();
    for key in index.keys() {
        let inputs = index
            .entry(key)
            .map(|e| e.inputs.join(", "))
            .unwrap_or_default();
        println!("  {:40} {}", key.yellow(), inputs.dimmed());
    }
}
