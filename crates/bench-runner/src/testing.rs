use crate::{
    resolve_plan, Adapter, AdapterRequest, BenchmarkPlan, DesignEntry, ExperimentEntry,
    FrameworkEntry, PlanOverrides, Progress, ResolvedPlan, Result, RunObserver,
};
use bench_core::{ExperimentKind, Job, MetricsMapping};
use chrono::Utc;
use std::path::{Path, PathBuf};

type Script = Box<dyn FnMut(&AdapterRequest<'_>, usize) -> Result<Vec<u8>>>;

/// In-memory adapter answering from a closure; records every call as
/// `framework::pipeline::experiment::stream`.
pub struct ScriptedAdapter {
    pub calls: Vec<String>,
    script: Script,
}

impl ScriptedAdapter {
    pub fn new<F>(script: F) -> Self
    where
        F: FnMut(&AdapterRequest<'_>, usize) -> Result<Vec<u8>> + 'static,
    {
        Self {
            calls: Vec::new(),
            script: Box::new(script),
        }
    }
}

impl Adapter for ScriptedAdapter {
    fn invoke(&mut self, request: &AdapterRequest<'_>) -> Result<Vec<u8>> {
        let index = self.calls.len();
        self.calls.push(format!(
            "{}::{}::{}::{}",
            request.framework, request.pipeline, request.experiment, request.stream
        ));
        (self.script)(request, index)
    }
}

/// A response of the request's experiment shape whose hashes depend only on
/// the job, so every framework agrees.
pub fn agreeing_response(request: &AdapterRequest<'_>, call: usize) -> Vec<u8> {
    let hashes = format!(
        "{{\"events\":{},\"t_hash\":\"{}-{}\"}}",
        request.pipeline.len() * 10 + request.stream.len(),
        request.pipeline,
        request.stream
    );
    match request.experiment {
        ExperimentKind::Duration => {
            format!("{{\"duration\":{},\"hashes\":{}}}\n", 1000 + call, hashes)
        }
        ExperimentKind::Latencies => format!(
            "{{\"hashes\":{},\"points\":[[5,{}],[9,{}]]}}\n",
            hashes,
            200 + call,
            300 + call
        ),
    }
    .into_bytes()
}

#[derive(Default)]
pub struct RecordingObserver {
    pub seed: Option<u64>,
    pub started: Vec<String>,
    pub validated: Vec<(String, MetricsMapping)>,
    pub progress: Vec<(usize, usize, String)>,
}

impl RunObserver for RecordingObserver {
    fn run_started(&mut self, seed: u64, _total_tasks: usize) {
        self.seed = Some(seed);
    }

    fn job_started(&mut self, job: &Job) {
        self.started.push(job.id());
    }

    fn job_validated(&mut self, job: &Job, reference: &MetricsMapping) {
        self.validated.push((job.id(), reference.clone()));
    }

    fn task_completed(&mut self, progress: &Progress<'_>) {
        self.progress
            .push((progress.position, progress.total, progress.name.to_string()));
    }
}

pub fn temp_root(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "bench_runner_{}_{}_{}",
        tag,
        std::process::id(),
        Utc::now().timestamp_micros()
    ))
}

/// 2 pipelines x 1 experiment (2 repetitions) x 2 streams x 2 frameworks.
pub fn small_plan(results_dir: &Path, seed: Option<u64>) -> ResolvedPlan {
    small_plan_with(results_dir, seed, &[("duration", 2)])
}

/// [`small_plan`] with the given `(experiment, repetitions)` list.
pub fn small_plan_with(
    results_dir: &Path,
    seed: Option<u64>,
    experiments: &[(&str, u32)],
) -> ResolvedPlan {
    let names = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
    let plan = BenchmarkPlan {
        version: "1".to_string(),
        pipelines: names(&["mask", "flow"]),
        experiments: experiments
            .iter()
            .map(|&(name, repetitions)| ExperimentEntry {
                name: name.to_string(),
                repetitions,
            })
            .collect(),
        streams: names(&["squares", "car"]),
        media_dir: PathBuf::from("media"),
        stream_extension: "es".to_string(),
        frameworks: vec![
            FrameworkEntry {
                name: "tarsier".to_string(),
                command: names(&["true"]),
            },
            FrameworkEntry {
                name: "kaer".to_string(),
                command: names(&["true"]),
            },
        ],
        results_dir: results_dir.to_path_buf(),
        design: DesignEntry {
            random_seed: seed,
            adapter_timeout_seconds: None,
        },
    };
    resolve_plan(
        Path::new("/bench/plan.yaml"),
        Path::new("/bench"),
        plan,
        &PlanOverrides::default(),
    )
    .expect("small plan is valid")
}
