use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use merge_csv::config::{load_config, ConfigOverrides};
use merge_csv::error::describe_error_code;
use merge_csv::orchestrator::{Orchestrator, StageGraph};
use merge_csv::stages::read_records;
use merge_csv::PipelineError;
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace};
use tracing_subscriber::EnvFilter;

/// Merge two CSV files on a key column into JSON records
#[derive(Parser)]
#[command(name = "merge-csv", version)]
#[command(about = "Merge two CSV files on a shared key into a JSON records file", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv adds thread ids and lines)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline (default command)
    Run(RunArgs),
    /// Print the stage graph
    Graph {
        #[arg(long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },
    /// Summarize a JSON records file
    Inspect {
        /// Records file to read
        file: PathBuf,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Path to configuration file (default: ./merge-csv.yml if present)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Left input file
    #[arg(long)]
    left: Option<PathBuf>,

    /// Right input file
    #[arg(long)]
    right: Option<PathBuf>,

    /// Output JSON file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Column to join on
    #[arg(long)]
    key: Option<String>,

    /// Field delimiter of both inputs
    #[arg(long)]
    delimiter: Option<char>,

    /// Run the loaders one after the other
    #[arg(long)]
    sequential: bool,

    /// Write a JSON run report to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Text,
    Dot,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("merge-csv started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result = match cli.command {
        Some(Commands::Run(args)) => run_pipeline(args).await,
        Some(Commands::Graph { format }) => print_graph(format),
        Some(Commands::Inspect { file }) => inspect(&file),
        None => run_pipeline(RunArgs::default()).await,
    };

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        if let Some(err) = e.chain().find_map(|c| c.downcast_ref::<PipelineError>()) {
            eprintln!("  E{:04}: {}", err.code(), describe_error_code(err.code()));
        }
        std::process::exit(1);
    }
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let (mut config, source) = load_config(args.config.as_deref(), &cwd)?;
    if let Some(path) = &source {
        debug!("Using configuration from {}", path.display());
    }

    config.apply_overrides(
        &ConfigOverrides {
            left: args.left,
            right: args.right,
            output: args.output,
            key: args.key,
            delimiter: args.delimiter,
            sequential: args.sequential,
        },
        &cwd,
    );
    let settings = config.resolve()?;
    let output = settings.output.clone();

    let orchestrator = Orchestrator::new(settings)?;
    let mut run = orchestrator.run().await;

    for record in &run.stages {
        match &record.error {
            Some(summary) if !record.succeeded() => println!(
                "{} {} ({} attempt(s)): {}",
                record.status.symbol(),
                record.stage,
                record.attempts,
                summary.message
            ),
            _ => println!(
                "{} {} ({} rows, {}ms)",
                record.status.symbol(),
                record.stage,
                record.rows.unwrap_or(0),
                record.duration_ms
            ),
        }
    }

    if let Some(report) = &args.report {
        let report = cwd.join(report);
        std::fs::write(&report, run.to_json_pretty()? + "\n")
            .with_context(|| format!("failed to write run report to {}", report.display()))?;
        debug!("Wrote run report to {}", report.display());
    }

    if let Some(err) = run.take_failure() {
        return Err(anyhow::Error::new(err).context(format!("pipeline '{}' failed", run.pipeline)));
    }
    println!("Wrote {}", output.display());
    Ok(())
}

fn print_graph(format: GraphFormat) -> anyhow::Result<()> {
    let graph = StageGraph::pipeline()?;
    match format {
        GraphFormat::Text => {
            for stage in graph.stages() {
                let predecessors: Vec<&str> =
                    graph.predecessors(stage).iter().map(|s| s.as_str()).collect();
                if predecessors.is_empty() {
                    println!("{}", stage);
                } else {
                    println!("{} <- {}", stage, predecessors.join(", "));
                }
            }
        }
        GraphFormat::Dot => print!("{}", graph.to_dot()),
    }
    Ok(())
}

fn inspect(file: &Path) -> anyhow::Result<()> {
    let table = read_records(file)?;
    println!("{}", file.display());
    println!("  rows:    {}", table.len());
    println!("  columns: {}", table.columns().len());
    for column in table.columns() {
        let nulls = table
            .column(column)
            .map(|values| values.filter(|v| v.is_null()).count())
            .unwrap_or(0);
        println!("    {} ({} null)", column, nulls);
    }
    Ok(())
}
