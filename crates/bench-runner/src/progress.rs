use bench_core::{Job, MetricsMapping, Task, TaskName};
use chrono::{DateTime, Utc};

/// Emitted after each task's result has been persisted.
#[derive(Debug, Clone)]
pub struct Progress<'a> {
    pub position: usize,
    pub total: usize,
    pub task: &'a Task,
    pub name: &'a TaskName,
    pub finished_at: DateTime<Utc>,
}

impl Progress<'_> {
    pub fn line(&self) -> String {
        format!(
            "{} / {} {} {}",
            self.position,
            self.total,
            self.name,
            self.finished_at.to_rfc3339()
        )
    }
}

/// Operator-facing reporting hooks. Every method defaults to doing nothing.
pub trait RunObserver {
    /// Called once with the shuffle seed, before any adapter is invoked.
    fn run_started(&mut self, _seed: u64, _total_tasks: usize) {}

    fn job_started(&mut self, _job: &Job) {}

    fn job_validated(&mut self, _job: &Job, _reference: &MetricsMapping) {}

    fn task_completed(&mut self, _progress: &Progress<'_>) {}
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl RunObserver for SilentObserver {}
