use crate::{Adapter, AdapterRequest, BenchError, Result, RunObserver};
use bench_core::{AdapterResponse, Job, JobSpace, MetricsMapping, Task};
use tracing::{info, warn};

/// Every framework's Metrics Mapping for a job whose frameworks disagree.
#[derive(Debug, Clone)]
pub struct Mismatch {
    pub job: Job,
    pub mappings: Vec<(String, MetricsMapping)>,
}

impl Mismatch {
    pub fn render(&self) -> String {
        let mut out = format!("the frameworks returned non-identical hashes for {}", self.job);
        for (framework, mapping) in &self.mappings {
            out.push_str(&format!("\n    {}:\n{}", framework, mapping.render(2)));
        }
        out
    }
}

/// Tasks of jobs whose frameworks all agreed, in generation order.
///
/// Only [`validate_jobs`] builds one, so a schedule cannot exist for a run
/// that has not passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedPlan {
    tasks: Vec<Task>,
    references: Vec<(Job, MetricsMapping)>,
}

impl ValidatedPlan {
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn references(&self) -> &[(Job, MetricsMapping)] {
        &self.references
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}

/// Runs every job once under every framework and compares each framework's
/// Metrics Mapping against the reference framework's.
///
/// Stops at the first job whose mappings differ and returns
/// [`BenchError::Mismatch`] carrying all of that job's mappings.
pub fn validate_jobs(
    space: &JobSpace,
    adapter: &mut dyn Adapter,
    observer: &mut dyn RunObserver,
) -> Result<ValidatedPlan> {
    let mut tasks = Vec::with_capacity(space.total_tasks());
    let mut references = Vec::with_capacity(space.job_count());
    for job in space.jobs() {
        observer.job_started(&job);
        let reference = validate_job(space, &job, adapter)?;
        info!(job = %job, metrics = reference.len(), "frameworks agree");
        observer.job_validated(&job, &reference);
        tasks.extend(space.expand(&job));
        references.push((job, reference));
    }
    Ok(ValidatedPlan { tasks, references })
}

fn validate_job(
    space: &JobSpace,
    job: &Job,
    adapter: &mut dyn Adapter,
) -> Result<MetricsMapping> {
    let mut mappings = Vec::with_capacity(space.frameworks().len());
    for framework in space.frameworks() {
        let stdout = adapter.invoke(&AdapterRequest::for_job(framework, job))?;
        let response =
            AdapterResponse::parse(&stdout, job.experiment).map_err(|e| BenchError::Malformed {
                framework: framework.clone(),
                job: job.id(),
                message: e.to_string(),
            })?;
        mappings.push((framework.clone(), response.hashes));
    }

    let reference = &mappings[0].1;
    let disagreeing: Vec<&str> = mappings[1..]
        .iter()
        .filter(|(_, mapping)| !mapping.matches(reference))
        .map(|(framework, _)| framework.as_str())
        .collect();
    if !disagreeing.is_empty() {
        warn!(job = %job, frameworks = ?disagreeing, "frameworks disagree with the reference");
        return Err(BenchError::Mismatch(Box::new(Mismatch {
            job: job.clone(),
            mappings,
        })));
    }
    Ok(mappings.swap_remove(0).1)
}
