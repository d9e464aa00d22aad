use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use roomplan_tools::config::PipelineConfig;
use roomplan_tools::detect::StructureInference;
use roomplan_tools::detect::gemini::GeminiStructureInference;
use roomplan_tools::io::excel_write;
use roomplan_tools::merge::JoinKind;
use roomplan_tools::pipeline::{Analysis, MergeRequest, Pipeline, SourceFile};
use roomplan_tools::session::{self, AnalysisRecord, AnalysisStore, JsonFileStore};
use roomplan_tools::{Result, ToolError};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(if error.is_validation() { 2 } else { 1 });
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Run(args) => execute_run(config, args),
        Command::Merge(args) => execute_merge(config, args),
        Command::Estimate(args) => execute_estimate(config, args),
        Command::Status(args) => execute_status(args),
    }
}

fn execute_run(config: PipelineConfig, args: RunArgs) -> Result<()> {
    let pipeline = build_pipeline(config, args.inputs.auto_detect())?;
    let request = args.inputs.to_request()?;
    let merge = pipeline.merge(&request)?;
    let estimation = pipeline.estimate(&merge, args.price_per_kwh)?;
    let analysis = Analysis { merge, estimation };

    excel_write::write_analysis(&args.output, &analysis)?;
    if let Some(path) = &args.report {
        write_json(path, &analysis.estimation.report)?;
    }
    print_json(&json!({
        "projectName": analysis.merge.project_name,
        "metrics": analysis.merge.metrics,
        "classification": analysis.merge.classification,
        "report": analysis.estimation.report,
    }))
}

fn execute_merge(config: PipelineConfig, args: MergeArgs) -> Result<()> {
    let pipeline = build_pipeline(config, args.inputs.auto_detect())?;
    let request = args.inputs.to_request()?;
    let merge = pipeline.merge(&request)?;

    if let Some(path) = &args.output {
        excel_write::write_merged(path, &merge)?;
    }
    let store = JsonFileStore::open(&args.store_dir)?;
    let record = AnalysisRecord::new(merge);
    store.create(&record)?;
    info!(id = %record.id, "analysis stored");

    print_json(&json!({
        "analysisId": record.id,
        "projectName": record.project_name(),
        "status": record.status,
        "metrics": record.merge.metrics,
        "classification": record.merge.classification,
        "columns": record.merge.table.columns,
    }))
}

fn execute_estimate(config: PipelineConfig, args: EstimateArgs) -> Result<()> {
    let store = JsonFileStore::open(&args.store_dir)?;
    let id = session::parse_id(&args.id)?;
    let mut record = store.get(&id)?;

    // Estimation never consults structure inference.
    let pipeline = Pipeline::new(config, None)?;
    let estimation = pipeline.estimate(&record.merge, args.price_per_kwh)?;
    record.record_estimation(estimation.clone());
    store.update(&record)?;

    if let Some(path) = &args.output {
        let analysis = Analysis {
            merge: record.merge.clone(),
            estimation: estimation.clone(),
        };
        excel_write::write_analysis(path, &analysis)?;
    }
    if let Some(path) = &args.report {
        write_json(path, &estimation.report)?;
    }
    print_json(&json!({
        "analysisId": record.id,
        "status": record.status,
        "report": estimation.report,
    }))
}

fn execute_status(args: StatusArgs) -> Result<()> {
    let store = JsonFileStore::open(&args.store_dir)?;
    let id = session::parse_id(&args.id)?;
    let record = store.get(&id)?;
    print_json(&json!({
        "analysisId": record.id,
        "projectName": record.project_name(),
        "status": record.status,
        "createdAt": record.created_at,
        "updatedAt": record.updated_at,
        "heatingFile": record.merge.heating_file,
        "ventilationFile": record.merge.ventilation_file,
        "rooms": record.merge.rooms.len(),
    }))
}

fn build_pipeline(config: PipelineConfig, auto_detect: bool) -> Result<Pipeline> {
    let inference: Option<Arc<dyn StructureInference>> = if auto_detect && config.inference.enabled
    {
        match GeminiStructureInference::from_env(&config.inference) {
            Ok(client) => Some(Arc::new(client)),
            Err(err) => {
                warn!(%err, "structure inference unavailable");
                None
            }
        }
    } else {
        None
    };
    Pipeline::new(config, inference)
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Merge heating and ventilation room schedules and estimate room power."
)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge both exports, estimate, and write the full workbook.
    Run(RunArgs),
    /// Merge both exports and store the analysis for a later estimate.
    Merge(MergeArgs),
    /// Estimate a stored analysis.
    Estimate(EstimateArgs),
    /// Show the state of a stored analysis.
    Status(StatusArgs),
}

#[derive(clap::Args)]
struct InputArgs {
    /// Heating/cooling export (.xls, .xlsx, .xlsm).
    #[arg(long)]
    heating: PathBuf,

    /// Ventilation export (.xls, .xlsx, .xlsm).
    #[arg(long)]
    ventilation: PathBuf,

    /// Name stored with the analysis.
    #[arg(long)]
    project_name: Option<String>,

    /// Zero-based header row applied to both exports.
    #[arg(long)]
    header_row: Option<usize>,

    /// Never escalate ambiguous headers to structure inference.
    #[arg(long)]
    no_auto_detect: bool,

    /// Which rooms survive the join.
    #[arg(long, value_enum, default_value_t = JoinArg::Outer)]
    how: JoinArg,
}

impl InputArgs {
    fn auto_detect(&self) -> bool {
        !self.no_auto_detect
    }

    fn to_request(&self) -> Result<MergeRequest> {
        let mut request = MergeRequest::new(
            SourceFile::from_path(&self.heating)?,
            SourceFile::from_path(&self.ventilation)?,
        );
        request.project_name = self.project_name.clone();
        request.header_row = self.header_row;
        request.auto_detect = self.auto_detect();
        request.how = self.how.into();
        Ok(request)
    }
}

#[derive(clap::Args)]
struct RunArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Energy price per kWh; defaults to the configured price.
    #[arg(long)]
    price_per_kwh: Option<f64>,

    /// Output workbook path.
    #[arg(long)]
    output: PathBuf,

    /// Optional JSON file receiving the portfolio report.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(clap::Args)]
struct MergeArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Directory holding stored analyses.
    #[arg(long, default_value = ".roomplan")]
    store_dir: PathBuf,

    /// Optional workbook receiving the merged rooms.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct EstimateArgs {
    /// Analysis id printed by `merge`.
    #[arg(long)]
    id: String,

    #[arg(long, default_value = ".roomplan")]
    store_dir: PathBuf,

    #[arg(long)]
    price_per_kwh: Option<f64>,

    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(clap::Args)]
struct StatusArgs {
    #[arg(long)]
    id: String,

    #[arg(long, default_value = ".roomplan")]
    store_dir: PathBuf,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum JoinArg {
    Outer,
    Left,
    Inner,
}

impl From<JoinArg> for JoinKind {
    fn from(kind: JoinArg) -> Self {
        match kind {
            JoinArg::Outer => JoinKind::Outer,
            JoinArg::Left => JoinKind::Left,
            JoinArg::Inner => JoinKind::Inner,
        }
    }
}
