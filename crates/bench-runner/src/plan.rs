use crate::{BenchError, Result};
use bench_core::{canonical_json_digest, Experiment, ExperimentKind, JobSpace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkPlan {
    pub version: String,
    pub pipelines: Vec<String>,
    pub experiments: Vec<ExperimentEntry>,
    pub streams: Vec<String>,
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    #[serde(default = "default_stream_extension")]
    pub stream_extension: String,
    pub frameworks: Vec<FrameworkEntry>,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default)]
    pub design: DesignEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentEntry {
    pub name: String,
    pub repetitions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameworkEntry {
    pub name: String,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesignEntry {
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default)]
    pub adapter_timeout_seconds: Option<u64>,
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

fn default_stream_extension() -> String {
    "es".to_string()
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Command-line values that take precedence over the plan file.
#[derive(Debug, Clone, Default)]
pub struct PlanOverrides {
    pub random_seed: Option<u64>,
    pub adapter_timeout_seconds: Option<u64>,
    pub results_dir: Option<PathBuf>,
}

/// A plan with overrides applied, names checked and paths made absolute.
#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    pub path: PathBuf,
    pub plan_dir: PathBuf,
    pub space: JobSpace,
    pub commands: BTreeMap<String, Vec<String>>,
    pub media_dir: PathBuf,
    pub stream_extension: String,
    pub results_dir: PathBuf,
    pub random_seed: Option<u64>,
    pub adapter_timeout: Option<Duration>,
    pub digest: String,
}

impl ResolvedPlan {
    pub fn stream_path(&self, stream: &str) -> PathBuf {
        stream_file(&self.media_dir, &self.stream_extension, stream)
    }
}

pub(crate) fn stream_file(media_dir: &Path, extension: &str, stream: &str) -> PathBuf {
    if extension.is_empty() {
        media_dir.join(stream)
    } else {
        media_dir.join(format!("{}.{}", stream, extension))
    }
}

pub fn load_plan(path: &Path, overrides: &PlanOverrides) -> Result<ResolvedPlan> {
    let raw = fs::read_to_string(path).map_err(|e| BenchError::Plan {
        path: path.to_path_buf(),
        message: format!("cannot read plan: {}", e),
    })?;
    let plan: BenchmarkPlan = serde_yaml::from_str(&raw).map_err(|e| BenchError::Plan {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let plan_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .canonicalize()
        .unwrap_or_else(|_| PathBuf::from("."));
    resolve_plan(path, &plan_dir, plan, overrides)
}

pub fn resolve_plan(
    path: &Path,
    plan_dir: &Path,
    mut plan: BenchmarkPlan,
    overrides: &PlanOverrides,
) -> Result<ResolvedPlan> {
    let plan_error = |message: String| BenchError::Plan {
        path: path.to_path_buf(),
        message,
    };

    if let Some(seed) = overrides.random_seed {
        plan.design.random_seed = Some(seed);
    }
    if let Some(seconds) = overrides.adapter_timeout_seconds {
        plan.design.adapter_timeout_seconds = Some(seconds);
    }
    if let Some(dir) = &overrides.results_dir {
        plan.results_dir = dir.clone();
    }
    if plan.design.adapter_timeout_seconds == Some(0) {
        return Err(plan_error(
            "design.adapter_timeout_seconds must be greater than zero".to_string(),
        ));
    }

    let mut experiments = Vec::with_capacity(plan.experiments.len());
    for entry in &plan.experiments {
        let kind = ExperimentKind::parse(&entry.name).ok_or_else(|| {
            plan_error(format!(
                "unknown experiment '{}' (expected duration or latencies)",
                entry.name
            ))
        })?;
        experiments.push(Experiment {
            kind,
            repetitions: entry.repetitions,
        });
    }

    let mut commands = BTreeMap::new();
    for framework in &plan.frameworks {
        if framework.command.is_empty() {
            return Err(plan_error(format!(
                "framework '{}' has an empty command",
                framework.name
            )));
        }
        let resolved = resolve_command_local(&framework.command, plan_dir);
        validate_adapter_command(&framework.name, &resolved)?;
        commands.insert(framework.name.clone(), resolved);
    }

    let space = JobSpace::new(
        plan.pipelines.clone(),
        experiments,
        plan.streams.clone(),
        plan.frameworks.iter().map(|f| f.name.clone()).collect(),
    )
    .map_err(|e| plan_error(e.to_string()))?;

    let digest = canonical_json_digest(&serde_json::to_value(&plan)?);

    Ok(ResolvedPlan {
        path: path.to_path_buf(),
        plan_dir: plan_dir.to_path_buf(),
        space,
        commands,
        media_dir: normalize_path(&plan_dir.join(&plan.media_dir)),
        stream_extension: plan.stream_extension,
        results_dir: normalize_path(&plan_dir.join(&plan.results_dir)),
        random_seed: plan.design.random_seed,
        adapter_timeout: plan.design.adapter_timeout_seconds.map(Duration::from_secs),
        digest,
    })
}

fn resolve_command_local(command: &[String], plan_dir: &Path) -> Vec<String> {
    let mut resolved = Vec::new();
    for part in command {
        let p = Path::new(part);
        if p.is_relative() && command_part_looks_like_path(part) {
            resolved.push(
                normalize_path(&plan_dir.join(p))
                    .to_string_lossy()
                    .to_string(),
            );
        } else {
            resolved.push(part.clone());
        }
    }
    resolved
}

/// Checks the first path-like token, which is the adapter script when the
/// program is an interpreter such as `node`.
fn validate_adapter_command(framework: &str, command: &[String]) -> Result<()> {
    let script = command
        .iter()
        .find(|part| command_part_looks_like_path(part) && Path::new(part).is_absolute());
    if let Some(script) = script {
        if !Path::new(script).exists() {
            return Err(BenchError::Plan {
                path: PathBuf::from(script),
                message: format!("adapter for framework '{}' not found", framework),
            });
        }
    }
    Ok(())
}

fn command_part_looks_like_path(part: &str) -> bool {
    if part.starts_with('-') || part.contains(char::is_whitespace) {
        return false;
    }
    part.starts_with('.')
        || part.starts_with('/')
        || part.contains('/')
        || part.ends_with(".js")
        || part.ends_with(".py")
        || part.ends_with(".sh")
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
