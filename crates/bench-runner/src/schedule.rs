use crate::ValidatedPlan;
use bench_core::Task;
use rand::seq::SliceRandom;
use rand::Rng;

/// The timed execution order.
#[derive(Debug, Clone)]
pub struct Schedule {
    tasks: Vec<Task>,
}

impl Schedule {
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}

/// Applies a uniform random permutation to the validated tasks so that
/// execution order is uncorrelated with job, framework and repetition.
pub fn schedule<R: Rng + ?Sized>(plan: ValidatedPlan, rng: &mut R) -> Schedule {
    let mut tasks = plan.into_tasks();
    tasks.shuffle(rng);
    Schedule { tasks }
}
