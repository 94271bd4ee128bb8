use anyhow::{anyhow, Context, Result};
use bench_core::{ExperimentKind, Job, MetricsMapping};
use bench_runner::{BenchError, PlanOverrides, Progress, RunObserver};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bench",
    version = "0.3.0",
    about = "Cross-framework event pipeline benchmark"
)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug); RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExperimentArg {
    #[value(name = "duration")]
    Duration,
    #[value(name = "latencies")]
    Latencies,
}

impl From<ExperimentArg> for ExperimentKind {
    fn from(value: ExperimentArg) -> Self {
        match value {
            ExperimentArg::Duration => ExperimentKind::Duration,
            ExperimentArg::Latencies => ExperimentKind::Latencies,
        }
    }
}

#[derive(clap::Args, Clone, Debug)]
struct OverrideArgs {
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    timeout_seconds: Option<u64>,
    #[arg(long)]
    results_dir: Option<PathBuf>,
}

impl From<OverrideArgs> for PlanOverrides {
    fn from(value: OverrideArgs) -> Self {
        PlanOverrides {
            random_seed: value.seed,
            adapter_timeout_seconds: value.timeout_seconds,
            results_dir: value.results_dir,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    Run {
        plan: PathBuf,
        #[command(flatten)]
        overrides: OverrideArgs,
        #[arg(long)]
        json: bool,
    },
    Validate {
        plan: PathBuf,
        #[command(flatten)]
        overrides: OverrideArgs,
        #[arg(long)]
        json: bool,
    },
    Describe {
        plan: PathBuf,
        #[command(flatten)]
        overrides: OverrideArgs,
        #[arg(long)]
        json: bool,
    },
    Init {
        #[arg(long, default_value = "bench.yaml")]
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
    /// Turn a pipeline's reference time and sink output into an adapter response.
    Normalize {
        #[arg(long, value_enum)]
        experiment: ExperimentArg,
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        sink: PathBuf,
        #[arg(long = "metric", required = true)]
        metrics: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            let code = exit_code(&err);
            if let Some(BenchError::Mismatch(mismatch)) = err.downcast_ref::<BenchError>() {
                eprintln!("{}", mismatch.render());
                if json_mode {
                    emit_json(&json_error(
                        "validation_mismatch",
                        err.to_string(),
                        json!({
                            "job": mismatch.job.id(),
                            "frameworks": mismatch
                                .mappings
                                .iter()
                                .map(|(framework, mapping)| (framework.clone(), json!(mapping)))
                                .collect::<serde_json::Map<_, _>>(),
                        }),
                    ));
                }
                std::process::exit(code);
            }
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(code);
            }
            Err(err)
        }
    }
}

/// 2 when the frameworks disagreed during validation, 1 for any other failure.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<BenchError>() {
        Some(BenchError::Mismatch(_)) => 2,
        _ => 1,
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Run {
            plan,
            overrides,
            json,
        } => {
            let resolved = load(&plan, overrides)?;
            let mut adapter = bench_runner::ProcessAdapter::from_plan(&resolved);
            let mut observer = ConsoleObserver::new(json);
            if !json {
                println!("{}", Utc::now().to_rfc3339());
            }
            let summary = bench_runner::run_benchmark(&resolved, &mut adapter, &mut observer)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "plan": plan.display().to_string(),
                    "digest": summary.digest,
                    "seed": summary.seed,
                    "jobs": summary.jobs,
                    "tasks": summary.tasks,
                    "results_dir": summary.results_dir.display().to_string(),
                    "started_at": summary.started_at.to_rfc3339(),
                    "finished_at": summary.finished_at.to_rfc3339(),
                })));
            }
            println!("results_dir: {}", summary.results_dir.display());
            println!("{}", summary.finished_at.to_rfc3339());
        }
        Commands::Validate {
            plan,
            overrides,
            json,
        } => {
            let resolved = load(&plan, overrides)?;
            let mut adapter = bench_runner::ProcessAdapter::from_plan(&resolved);
            let mut observer = ConsoleObserver::new(json);
            let validated =
                bench_runner::validate_jobs(&resolved.space, &mut adapter, &mut observer)?;
            if json {
                let references = validated
                    .references()
                    .iter()
                    .map(|(job, mapping)| (job.id(), json!(mapping)))
                    .collect::<serde_json::Map<_, _>>();
                return Ok(Some(json!({
                    "ok": true,
                    "command": "validate",
                    "jobs": validated.references().len(),
                    "tasks": validated.tasks().len(),
                    "references": references,
                })));
            }
            println!("validated_jobs: {}", validated.references().len());
            println!("tasks: {}", validated.tasks().len());
        }
        Commands::Describe {
            plan,
            overrides,
            json,
        } => {
            let resolved = load(&plan, overrides)?;
            let summary = bench_runner::describe_plan(&resolved);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "summary": summary_to_json(&summary),
                })));
            }
            print_summary(&summary);
        }
        Commands::Init { path, force } => {
            write_plan_template(&path, force)?;
            println!("wrote: {}", path.display());
            println!("next: bench describe {}", path.display());
        }
        Commands::Normalize {
            experiment,
            reference,
            sink,
            metrics,
        } => {
            let reference = read_json(&reference)?;
            let sink = read_json(&sink)?;
            let response = bench_core::normalize(experiment.into(), &reference, &sink, &metrics)?;
            println!("{}", serde_json::to_string(&response)?);
        }
    }
    Ok(None)
}

/// Prints job identities, reference mappings and progress lines the way an
/// operator watches a campaign. JSON mode keeps stdout for the final document.
struct ConsoleObserver {
    quiet: bool,
}

impl ConsoleObserver {
    fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl RunObserver for ConsoleObserver {
    fn run_started(&mut self, seed: u64, total_tasks: usize) {
        if !self.quiet {
            println!("seed: {}", seed);
            println!("tasks: {}", total_tasks);
        }
    }

    fn job_started(&mut self, job: &Job) {
        if !self.quiet {
            println!("{}", job);
        }
    }

    fn job_validated(&mut self, _job: &Job, reference: &MetricsMapping) {
        if !self.quiet {
            println!("{}", reference.render(1));
        }
    }

    fn task_completed(&mut self, progress: &Progress<'_>) {
        if !self.quiet {
            println!("{}", progress.line());
        }
    }
}

fn load(plan: &Path, overrides: OverrideArgs) -> Result<bench_runner::ResolvedPlan> {
    let resolved = bench_runner::load_plan(plan, &overrides.into())?;
    info!(
        plan = %plan.display(),
        digest = %resolved.digest,
        jobs = resolved.space.job_count(),
        tasks = resolved.space.total_tasks(),
        "plan loaded"
    );
    Ok(resolved)
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. }
        | Commands::Validate { json, .. }
        | Commands::Describe { json, .. } => *json,
        _ => false,
    }
}

fn summary_to_json(summary: &bench_runner::PlanSummary) -> Value {
    json!({
        "plan": summary.plan.display().to_string(),
        "digest": summary.digest,
        "pipelines": summary.pipelines,
        "experiments": summary
            .experiments
            .iter()
            .map(|(name, repetitions)| json!({"name": name, "repetitions": repetitions}))
            .collect::<Vec<_>>(),
        "streams": summary.streams,
        "frameworks": summary.frameworks,
        "reference_framework": summary.reference_framework,
        "jobs": summary.jobs,
        "total_tasks": summary.total_tasks,
        "results_dir": summary.results_dir.display().to_string(),
        "random_seed": summary.random_seed,
        "adapter_timeout_seconds": summary.adapter_timeout.map(|d| d.as_secs()),
    })
}

fn print_summary(summary: &bench_runner::PlanSummary) {
    println!("plan: {}", summary.plan.display());
    println!("digest: {}", summary.digest);
    println!("pipelines: {}", summary.pipelines.join(", "));
    for (name, repetitions) in &summary.experiments {
        println!("experiment: {} x{}", name, repetitions);
    }
    println!("streams: {}", summary.streams.join(", "));
    println!("frameworks: {}", summary.frameworks.join(", "));
    println!("reference_framework: {}", summary.reference_framework);
    println!("jobs: {}", summary.jobs);
    println!("total_tasks: {}", summary.total_tasks);
    println!("results_dir: {}", summary.results_dir.display());
    match summary.random_seed {
        Some(seed) => println!("random_seed: {}", seed),
        None => println!("random_seed: drawn per run"),
    }
    match summary.adapter_timeout {
        Some(timeout) => println!("adapter_timeout_seconds: {}", timeout.as_secs()),
        None => println!("adapter_timeout_seconds: none"),
    }
}

fn write_plan_template(path: &Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        return Err(anyhow!(
            "plan file already exists (use --force): {}",
            path.display()
        ));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let template = "\
version: '1'
pipelines: [mask, flow, denoised_flow, masked_denoised_flow, masked_denoised_flow_activity]
experiments:
  - { name: duration, repetitions: 100 }
  - { name: latencies, repetitions: 10 }
streams: [squares, street, car]
media_dir: media                      # stream path = <media_dir>/<stream>.<stream_extension>
stream_extension: es
frameworks:                           # the first framework is the reference
  - { name: caer, command: [node, --max-old-space-size=16384, ./frameworks/caer/run_task.js] }
  - { name: kaer, command: [node, --max-old-space-size=16384, ./frameworks/kaer/run_task.js] }
  - { name: tarsier, command: [node, --max-old-space-size=16384, ./frameworks/tarsier/run_task.js] }
  - { name: yarp, command: [node, --max-old-space-size=16384, ./frameworks/yarp/run_task.js] }
results_dir: results
design:
  random_seed: null                   # drawn and reported per run when null
  adapter_timeout_seconds: null       # null waits for each adapter indefinitely
";
    std::fs::write(path, template)?;
    Ok(())
}
