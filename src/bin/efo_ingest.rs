use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use efo_ingest::config::{ConfigLoader, ResolvedConfig};
use efo_ingest::error::PipelineError;
use efo_ingest::ols::OlsHttpClient;
use efo_ingest::output::{ClearResult, JsonOutput, TableInfo, TablesResult, TraceSink};
use efo_ingest::pipeline::{Pipeline, RunOptions};
use efo_ingest::warehouse::{JsonWarehouse, Warehouse};

#[derive(Parser)]
#[command(name = "efo-ingest")]
#[command(about = "Incremental OLS EFO ontology term ingestion with parent-graph derivation")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the ingestion pipeline")]
    Run(RunArgs),
    #[command(about = "List warehouse tables with row counts")]
    Tables(DatasetArgs),
    #[command(about = "Drop the local warehouse dataset")]
    Clear(DatasetArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    config: Option<String>,

    /// Maximum number of terms to ingest; 0 means unbounded.
    #[arg(long)]
    limit: Option<u64>,

    /// Resolve parent lookups one at a time instead of fanning out.
    #[arg(long)]
    sequential: bool,

    /// Extract and resolve without committing anything.
    #[arg(long)]
    dry_run: bool,

    /// Drop the warehouse dataset before running.
    #[arg(long)]
    refresh: bool,
}

#[derive(Args)]
struct DatasetArgs {
    #[arg(long)]
    config: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::ConfigRead(_) | PipelineError::ConfigParse(_) => 2,
        PipelineError::OlsHttp(_)
        | PipelineError::OlsStatus { .. }
        | PipelineError::PageDecode { .. }
        | PipelineError::MalformedTerm(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_pipeline(args),
        Commands::Tables(args) => run_tables(args),
        Commands::Clear(args) => run_clear(args),
    }
}

fn run_pipeline(args: RunArgs) -> miette::Result<()> {
    let mut config = resolve_config(args.config.as_deref())?;
    if let Some(limit) = args.limit {
        config.limit = (limit > 0).then_some(limit);
    }
    if args.sequential {
        config.parallel_fanout = false;
    }

    let warehouse = JsonWarehouse::new(config.warehouse_dir.clone());
    if args.refresh {
        warehouse.clear()?;
    }

    let client = OlsHttpClient::new()?;
    let pipeline = Pipeline::new(client, warehouse, config);
    let summary = pipeline.run(
        RunOptions {
            dry_run: args.dry_run,
        },
        &TraceSink,
    )?;
    JsonOutput::print_summary(&summary).into_diagnostic()?;
    Ok(())
}

fn run_tables(args: DatasetArgs) -> miette::Result<()> {
    let config = resolve_config(args.config.as_deref())?;
    let warehouse = JsonWarehouse::new(config.warehouse_dir.clone());

    let mut tables = Vec::new();
    for name in warehouse.table_names()? {
        let rows = warehouse.row_count(&name)?;
        tables.push(TableInfo { name, rows });
    }
    JsonOutput::print_tables(&TablesResult { tables }).into_diagnostic()?;
    Ok(())
}

fn run_clear(args: DatasetArgs) -> miette::Result<()> {
    let config = resolve_config(args.config.as_deref())?;
    let warehouse = JsonWarehouse::new(config.warehouse_dir.clone());
    warehouse.clear()?;
    JsonOutput::print_clear(&ClearResult { cleared: true }).into_diagnostic()?;
    Ok(())
}

fn resolve_config(path: Option<&str>) -> miette::Result<ResolvedConfig> {
    Ok(ConfigLoader::resolve(path)?)
}
