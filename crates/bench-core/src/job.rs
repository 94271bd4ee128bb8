use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Joins the parts of job identities and task names.
pub const NAME_SEPARATOR: &str = "::";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentKind {
    Duration,
    Latencies,
}

impl ExperimentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentKind::Duration => "duration",
            ExperimentKind::Latencies => "latencies",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "duration" => Some(ExperimentKind::Duration),
            "latencies" => Some(ExperimentKind::Latencies),
            _ => None,
        }
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub kind: ExperimentKind,
    pub repetitions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Job {
    pub pipeline: String,
    pub experiment: ExperimentKind,
    pub stream: String,
}

impl Job {
    pub fn id(&self) -> String {
        [self.pipeline.as_str(), self.experiment.as_str(), self.stream.as_str()]
            .join(NAME_SEPARATOR)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskName(String);

impl TaskName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Task {
    pub job: Job,
    pub framework: String,
    pub repetition: u32,
}

impl Task {
    pub fn name(&self) -> TaskName {
        TaskName(format!(
            "{}{sep}{}{sep}{}",
            self.job.id(),
            self.framework,
            self.repetition,
            sep = NAME_SEPARATOR
        ))
    }
}

/// The ordered lists a benchmark campaign is built from.
///
/// Names are checked on construction: every list is non-empty, names are
/// unique within their list and never contain [`NAME_SEPARATOR`] or a path
/// separator. Together these make every task name distinct and usable as a
/// file name.
#[derive(Debug, Clone)]
pub struct JobSpace {
    pipelines: Vec<String>,
    experiments: Vec<Experiment>,
    streams: Vec<String>,
    frameworks: Vec<String>,
}

impl JobSpace {
    pub fn new(
        pipelines: Vec<String>,
        experiments: Vec<Experiment>,
        streams: Vec<String>,
        frameworks: Vec<String>,
    ) -> Result<Self, CoreError> {
        check_names("pipelines", &pipelines)?;
        check_names("streams", &streams)?;
        check_names("frameworks", &frameworks)?;
        if experiments.is_empty() {
            return Err(CoreError::InvalidJobSpace(
                "experiments must not be empty".to_string(),
            ));
        }
        let mut kinds = BTreeSet::new();
        for experiment in &experiments {
            if !kinds.insert(experiment.kind) {
                return Err(CoreError::InvalidJobSpace(format!(
                    "duplicate experiment: {}",
                    experiment.kind
                )));
            }
            if experiment.repetitions == 0 {
                return Err(CoreError::InvalidJobSpace(format!(
                    "experiment {} must have at least one repetition",
                    experiment.kind
                )));
            }
        }
        Ok(Self {
            pipelines,
            experiments,
            streams,
            frameworks,
        })
    }

    pub fn pipelines(&self) -> &[String] {
        &self.pipelines
    }

    pub fn experiments(&self) -> &[Experiment] {
        &self.experiments
    }

    pub fn streams(&self) -> &[String] {
        &self.streams
    }

    pub fn frameworks(&self) -> &[String] {
        &self.frameworks
    }

    /// Framework index 0; every other framework is compared against it.
    pub fn reference_framework(&self) -> &str {
        &self.frameworks[0]
    }

    pub fn repetitions(&self, kind: ExperimentKind) -> u32 {
        self.experiments
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.repetitions)
            .unwrap_or(0)
    }

    /// Pipelines, then experiments, then streams.
    pub fn jobs(&self) -> Vec<Job> {
        let mut jobs =
            Vec::with_capacity(self.pipelines.len() * self.experiments.len() * self.streams.len());
        for pipeline in &self.pipelines {
            for experiment in &self.experiments {
                for stream in &self.streams {
                    jobs.push(Job {
                        pipeline: pipeline.clone(),
                        experiment: experiment.kind,
                        stream: stream.clone(),
                    });
                }
            }
        }
        jobs
    }

    /// Framework-major, repetition-minor.
    pub fn expand(&self, job: &Job) -> Vec<Task> {
        let repetitions = self.repetitions(job.experiment);
        let mut tasks = Vec::with_capacity(self.frameworks.len() * repetitions as usize);
        for framework in &self.frameworks {
            for repetition in 0..repetitions {
                tasks.push(Task {
                    job: job.clone(),
                    framework: framework.clone(),
                    repetition,
                });
            }
        }
        tasks
    }

    pub fn job_count(&self) -> usize {
        self.pipelines.len() * self.experiments.len() * self.streams.len()
    }

    pub fn total_tasks(&self) -> usize {
        let repetitions: usize = self
            .experiments
            .iter()
            .map(|e| e.repetitions as usize)
            .sum();
        self.pipelines.len() * self.streams.len() * self.frameworks.len() * repetitions
    }
}

fn check_names(list: &str, names: &[String]) -> Result<(), CoreError> {
    if names.is_empty() {
        return Err(CoreError::InvalidJobSpace(format!(
            "{} must not be empty",
            list
        )));
    }
    let mut seen = BTreeSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(CoreError::InvalidJobSpace(format!(
                "{} contains an empty name",
                list
            )));
        }
        if name.contains(NAME_SEPARATOR) || name.contains('/') || name.contains('\\') {
            return Err(CoreError::InvalidJobSpace(format!(
                "{} name '{}' must not contain '{}' or a path separator",
                list, name, NAME_SEPARATOR
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(CoreError::InvalidJobSpace(format!(
                "duplicate name in {}: {}",
                list, name
            )));
        }
    }
    Ok(())
}
