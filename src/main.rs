use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use driftline::diagnostics;
use driftline::types::{FileChange, FileChangeType, SemanticChange, Severity};
use driftline::{BaselineSummary, Engine};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "driftline", about = "Baseline snapshots and semantic change detection for source trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Project root
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare symbols (or files, with --since) against the baseline
    Diff {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
        /// List files changed since a git revision instead
        #[arg(long)]
        since: Option<String>,
    },
    /// Create the checksum and symbol baselines
    Init {
        /// Overwrite existing baselines
        #[arg(long)]
        reset: bool,
    },
    /// List files changed since the checksum baseline
    Status,
    /// Print the symbols of the current tree
    Symbols {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Refresh both baselines
    Update,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = Engine::open(&cli.root).and_then(|engine| {
        return match cli.command {
            Commands::Diff { json, since: Some(revision) } => engine.changes_since(&revision).map(|c| return print_file_changes(&c, json)),
            Commands::Diff { json, since: None } => engine.semantic_diff().map(|c| return print_semantic_changes(&c, json)),
            Commands::Init { reset } => engine.initialize(reset).map(|s| return print_summary("Initialized", &s)),
            Commands::Status => engine.check().map(|c| return print_file_changes(&c, false)),
            Commands::Symbols { json } => engine.extract_symbols().map(|e| return print_symbols(&e, json)),
            Commands::Update => engine.update().map(|s| return print_summary("Updated", &s)),
        };
    });

    return match result {
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(2)
        },
        Ok(code) => code,
    };
}

/// Install the stderr subscriber. `DRIFTLINE_LOG` wins over `RUST_LOG`,
/// which wins over the `-v`/`-q` flags; the default level is `warn`.
fn init_tracing(verbose: bool, quiet: bool) {
    let fallback = if verbose {
        "warn,driftline=debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = std::env::var("DRIFTLINE_LOG")
        .ok()
        .and_then(|directives| return EnvFilter::try_new(directives).ok())
        .or_else(|| return EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| return EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .compact()
        .init();
}

/// Print file changes; exit 1 when there are any.
fn print_file_changes(changes: &[FileChange], json: bool) -> ExitCode {
    if json {
        println!("{}", serde_json::to_string_pretty(changes).unwrap_or_default());
    } else if changes.is_empty() {
        println!("No changes");
    } else {
        for change in changes {
            let label = match change.change_type {
                FileChangeType::Added => "ADDED   ",
                FileChangeType::Deleted => "DELETED ",
                FileChangeType::Modified => "MODIFIED",
            };
            println!("{label} {}", change.file);
        }
        println!("\n{} changed", changes.len());
    }
    return if changes.is_empty() { ExitCode::SUCCESS } else { ExitCode::from(1) };
}

/// Print semantic changes. Exit code priority: breaking (2) > any (1) > none (0).
fn print_semantic_changes(changes: &[SemanticChange], json: bool) -> ExitCode {
    let breaking = changes.iter().filter(|c| return c.severity == Severity::Breaking).count();

    if json {
        println!("{}", serde_json::to_string_pretty(changes).unwrap_or_default());
    } else if changes.is_empty() {
        println!("No symbol changes");
    } else {
        for change in changes {
            let severity = match change.severity {
                Severity::Breaking => "BREAKING",
                Severity::NonBreaking => "        ",
                Severity::Unknown => "UNKNOWN ",
            };
            let at = change.line.map_or_else(|| return change.file.clone(), |l| return format!("{}:{l}", change.file));
            println!("{severity} {:?} {} ({at})", change.change_type, change.name);
            if let (Some(old), Some(new)) = (&change.old_signature, &change.new_signature)
                && old != new
            {
                println!("           - {old}\n           + {new}");
            }
        }
        println!("\n{} changes, {breaking} breaking", changes.len());
    }

    if breaking > 0 {
        return ExitCode::from(2);
    }
    return if changes.is_empty() { ExitCode::SUCCESS } else { ExitCode::from(1) };
}

/// One-line report for initialize/update.
fn print_summary(verb: &str, summary: &BaselineSummary) -> ExitCode {
    println!("{verb} baselines: {} files, {} symbols", summary.files, summary.symbols);
    for (file, reason) in &summary.skipped {
        println!("SKIPPED  {file} ({reason:?})");
    }
    return ExitCode::SUCCESS;
}

/// Print extracted symbols as `file:line kind name`, or as JSON.
fn print_symbols(extraction: &driftline::extractor::Extraction, json: bool) -> ExitCode {
    if json {
        println!("{}", serde_json::to_string_pretty(&extraction.symbols).unwrap_or_default());
        return ExitCode::SUCCESS;
    }
    for symbol in extraction.symbols.values().flatten() {
        let owner = symbol.enclosing.as_deref().map(|e| return format!("{e}.")).unwrap_or_default();
        println!("{}:{} {:?} {owner}{}", symbol.file, symbol.line, symbol.kind, symbol.name);
    }
    return ExitCode::SUCCESS;
}
