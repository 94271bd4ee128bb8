use crate::{
    Adapter, AdapterRequest, BenchError, Progress, Result, ResultStore, RunObserver, Schedule,
};
use bench_core::AdapterResponse;
use chrono::Utc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub completed: usize,
}

/// Runs the schedule one task at a time and persists each adapter response
/// verbatim under the task's name. A response that is not a document of the
/// experiment's shape stops the run before it is written.
pub fn execute(
    schedule: Schedule,
    adapter: &mut dyn Adapter,
    store: &ResultStore,
    observer: &mut dyn RunObserver,
) -> Result<ExecutionReport> {
    let total = schedule.len();
    for (index, task) in schedule.into_tasks().into_iter().enumerate() {
        let name = task.name();
        let record = adapter.invoke(&AdapterRequest::for_job(&task.framework, &task.job))?;
        // Shape is checked, but the stored bytes stay exactly as returned.
        AdapterResponse::parse(&record, task.job.experiment).map_err(|e| {
            BenchError::Malformed {
                framework: task.framework.clone(),
                job: task.job.id(),
                message: e.to_string(),
            }
        })?;
        let path = store.write(&name, &record)?;
        // Release the record before the next adapter starts.
        drop(record);

        let progress = Progress {
            position: index + 1,
            total,
            task: &task,
            name: &name,
            finished_at: Utc::now(),
        };
        info!(
            position = progress.position,
            total,
            task = %name,
            path = %path.display(),
            "task completed"
        );
        observer.task_completed(&progress);
    }
    Ok(ExecutionReport { completed: total })
}
