//! Cross-framework validation and randomized sequential timing runs.
//!
//! A run goes through three stages that each consume the previous stage's
//! value: [`validate_jobs`] produces a [`ValidatedPlan`], [`schedule`] turns
//! it into a shuffled [`Schedule`], and [`execute`] runs the schedule and
//! persists every result in a [`ResultStore`].

mod adapter;
mod error;
mod execute;
mod plan;
mod progress;
mod schedule;
mod store;
mod validate;

#[cfg(test)]
mod testing;

pub use adapter::{Adapter, AdapterRequest, ProcessAdapter};
pub use error::{BenchError, Result};
pub use execute::{execute, ExecutionReport};
pub use plan::{
    load_plan, resolve_plan, BenchmarkPlan, DesignEntry, ExperimentEntry, FrameworkEntry,
    PlanOverrides, ResolvedPlan,
};
pub use progress::{Progress, RunObserver, SilentObserver};
pub use schedule::{schedule, Schedule};
pub use store::ResultStore;
pub use validate::{validate_jobs, Mismatch, ValidatedPlan};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub digest: String,
    pub seed: u64,
    pub jobs: usize,
    pub tasks: usize,
    pub results_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub plan: PathBuf,
    pub digest: String,
    pub pipelines: Vec<String>,
    pub experiments: Vec<(String, u32)>,
    pub streams: Vec<String>,
    pub frameworks: Vec<String>,
    pub reference_framework: String,
    pub jobs: usize,
    pub total_tasks: usize,
    pub results_dir: PathBuf,
    pub random_seed: Option<u64>,
    pub adapter_timeout: Option<Duration>,
}

pub fn describe_plan(plan: &ResolvedPlan) -> PlanSummary {
    let space = &plan.space;
    PlanSummary {
        plan: plan.path.clone(),
        digest: plan.digest.clone(),
        pipelines: space.pipelines().to_vec(),
        experiments: space
            .experiments()
            .iter()
            .map(|e| (e.kind.as_str().to_string(), e.repetitions))
            .collect(),
        streams: space.streams().to_vec(),
        frameworks: space.frameworks().to_vec(),
        reference_framework: space.reference_framework().to_string(),
        jobs: space.job_count(),
        total_tasks: space.total_tasks(),
        results_dir: plan.results_dir.clone(),
        random_seed: plan.random_seed,
        adapter_timeout: plan.adapter_timeout,
    }
}

/// Validates every job, then shuffles and runs all tasks.
///
/// Nothing is written to the results directory unless every job validates.
/// When the plan has no seed a fresh one is drawn; it is returned in the
/// summary so the order can be reproduced.
pub fn run_benchmark(
    plan: &ResolvedPlan,
    adapter: &mut dyn Adapter,
    observer: &mut dyn RunObserver,
) -> Result<RunSummary> {
    let started_at = Utc::now();
    let seed = plan.random_seed.unwrap_or_else(rand::random);
    info!(
        plan = %plan.path.display(),
        digest = %plan.digest,
        seed,
        jobs = plan.space.job_count(),
        tasks = plan.space.total_tasks(),
        "starting benchmark"
    );
    observer.run_started(seed, plan.space.total_tasks());

    let validated = validate_jobs(&plan.space, adapter, observer)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let schedule = schedule(validated, &mut rng);
    let store = ResultStore::open(&plan.results_dir)?;
    let report = execute(schedule, adapter, &store, observer)?;

    let finished_at = Utc::now();
    info!(
        tasks = report.completed,
        elapsed_s = (finished_at - started_at).num_seconds(),
        "benchmark finished"
    );
    Ok(RunSummary {
        digest: plan.digest.clone(),
        seed,
        jobs: plan.space.job_count(),
        tasks: report.completed,
        results_dir: store.dir().to_path_buf(),
        started_at,
        finished_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        agreeing_response, small_plan, small_plan_with, temp_root, RecordingObserver,
        ScriptedAdapter,
    };
    use bench_core::Task;
    use std::collections::HashSet;
    use std::fs;

    fn result_files(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("results dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn full_run_persists_one_file_per_task() {
        let root = temp_root("full_run");
        let plan = small_plan(&root, Some(42));
        let mut adapter = ScriptedAdapter::new(|req, call| Ok(agreeing_response(req, call)));
        let mut observer = RecordingObserver::default();

        let summary = run_benchmark(&plan, &mut adapter, &mut observer).expect("run succeeds");
        assert_eq!(summary.seed, 42);
        assert_eq!(summary.jobs, 4);
        assert_eq!(summary.tasks, 2 * 2 * 2 * 2);
        assert_eq!(adapter.calls.len(), 4 * 2 + 16);
        assert_eq!(observer.started.len(), 4);
        assert_eq!(observer.seed, Some(42));

        let files = result_files(&root);
        assert_eq!(files.len(), 16);
        assert!(files.contains(&"mask::duration::squares::tarsier::0.json".to_string()));
        assert!(files.contains(&"flow::duration::car::kaer::1.json".to_string()));

        let positions: Vec<usize> = observer.progress.iter().map(|p| p.0).collect();
        assert_eq!(positions, (1..=16).collect::<Vec<_>>());
        assert!(observer.progress.iter().all(|p| p.1 == 16));
        let names: HashSet<&String> = observer.progress.iter().map(|p| &p.2).collect();
        assert_eq!(names.len(), 16);
        assert_eq!(
            observer.validated.iter().map(|v| v.0.as_str()).collect::<Vec<_>>(),
            vec![
                "mask::duration::squares",
                "mask::duration::car",
                "flow::duration::squares",
                "flow::duration::car"
            ]
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn stored_record_is_the_raw_adapter_output() {
        let root = temp_root("raw_record");
        let plan = small_plan(&root, Some(1));
        let mut adapter = ScriptedAdapter::new(|req, call| {
            // Whitespace and key order must survive untouched.
            let mut body = b"  ".to_vec();
            body.extend(agreeing_response(req, call));
            Ok(body)
        });
        run_benchmark(&plan, &mut adapter, &mut SilentObserver).expect("run succeeds");
        let stored = fs::read(root.join("mask::duration::car::kaer::0.json")).expect("stored");
        assert!(stored.starts_with(b"  {\"duration\":"));
        assert!(stored.ends_with(b"}}\n"));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn mismatch_aborts_before_any_task_is_scheduled() {
        let root = temp_root("mismatch");
        let plan = small_plan(&root, Some(3));
        let mut adapter = ScriptedAdapter::new(|req, call| {
            if req.framework == "kaer" && req.pipeline == "mask" && req.stream == "car" {
                return Ok(br#"{"duration":5,"hashes":{"events":1,"t_hash":"other"}}"#.to_vec());
            }
            Ok(agreeing_response(req, call))
        });
        let mut observer = RecordingObserver::default();

        let err = run_benchmark(&plan, &mut adapter, &mut observer).expect_err("must abort");
        let mismatch = match err {
            BenchError::Mismatch(m) => m,
            other => panic!("unexpected error: {}", other),
        };
        assert_eq!(mismatch.job.id(), "mask::duration::car");
        assert_eq!(mismatch.mappings.len(), 2);
        assert_eq!(mismatch.mappings[0].0, "tarsier");
        assert_eq!(mismatch.mappings[1].0, "kaer");
        let report = mismatch.render();
        assert!(report.contains("non-identical hashes for mask::duration::car"));
        assert!(report.contains("    tarsier:\n        events: 43\n        t_hash: mask-car"));
        assert!(report.contains("    kaer:\n        events: 1\n        t_hash: other"));

        // Second job fails, so only two jobs were ever run and nothing executed.
        assert_eq!(adapter.calls.len(), 4);
        assert_eq!(observer.seed, Some(3), "seed is reported before validation");
        assert_eq!(observer.validated.len(), 1);
        assert!(observer.progress.is_empty());
        assert!(!root.exists(), "results dir must not be created");
    }

    #[test]
    fn extra_metric_key_is_a_mismatch() {
        let root = temp_root("extra_key");
        let plan = small_plan(&root, Some(3));
        let mut adapter = ScriptedAdapter::new(|req, call| {
            if req.framework == "kaer" {
                return Ok(format!(
                    "{{\"duration\":1,\"hashes\":{{\"events\":{},\"t_hash\":\"{}-{}\",\"x_hash\":\"0\"}}}}",
                    req.pipeline.len() * 10 + req.stream.len(),
                    req.pipeline,
                    req.stream
                )
                .into_bytes());
            }
            Ok(agreeing_response(req, call))
        });
        let err = run_benchmark(&plan, &mut adapter, &mut SilentObserver).expect_err("must abort");
        assert!(matches!(err, BenchError::Mismatch(_)), "{}", err);
        assert_eq!(adapter.calls.len(), 2);
    }

    #[test]
    fn malformed_validation_output_is_fatal() {
        let root = temp_root("malformed");
        let plan = small_plan(&root, Some(3));
        let mut adapter = ScriptedAdapter::new(|req, call| {
            if req.framework == "kaer" {
                return Ok(b"unknown pipeline mask\n".to_vec());
            }
            Ok(agreeing_response(req, call))
        });
        let err = run_benchmark(&plan, &mut adapter, &mut SilentObserver).expect_err("must abort");
        match err {
            BenchError::Malformed { framework, job, .. } => {
                assert_eq!(framework, "kaer");
                assert_eq!(job, "mask::duration::squares");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!root.exists());
    }

    #[test]
    fn adapter_failure_during_execution_stops_the_run() {
        let root = temp_root("exec_failure");
        let plan = small_plan(&root, Some(9));
        let mut adapter = ScriptedAdapter::new(|req, call| {
            if call == 8 + 3 {
                return Err(BenchError::AdapterFailed {
                    framework: req.framework.to_string(),
                    command: "true".to_string(),
                    status: "1".to_string(),
                });
            }
            Ok(agreeing_response(req, call))
        });
        let mut observer = RecordingObserver::default();
        let err = run_benchmark(&plan, &mut adapter, &mut observer).expect_err("must stop");
        assert!(matches!(err, BenchError::AdapterFailed { .. }), "{}", err);
        assert_eq!(observer.progress.len(), 3);
        assert_eq!(result_files(&root).len(), 3);
        assert_eq!(adapter.calls.len(), 12);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn non_json_result_during_execution_is_not_persisted() {
        let root = temp_root("exec_malformed");
        let plan = small_plan(&root, Some(9));
        let mut adapter = ScriptedAdapter::new(|req, call| {
            if call >= 8 {
                return Ok(b"{\"duration\":".to_vec());
            }
            Ok(agreeing_response(req, call))
        });
        let err = run_benchmark(&plan, &mut adapter, &mut SilentObserver).expect_err("must stop");
        assert!(matches!(err, BenchError::Malformed { .. }), "{}", err);
        assert!(result_files(&root).is_empty());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn shapeless_result_during_execution_is_not_persisted() {
        for body in [&b"[]"[..], &b"null"[..], &br#"{"hashes":{}}"#[..]] {
            let root = temp_root("exec_shapeless");
            let plan = small_plan(&root, Some(9));
            let mut adapter = ScriptedAdapter::new(move |req, call| {
                if call >= 8 {
                    return Ok(body.to_vec());
                }
                Ok(agreeing_response(req, call))
            });
            let mut observer = RecordingObserver::default();
            let err = run_benchmark(&plan, &mut adapter, &mut observer).expect_err("must stop");
            assert!(matches!(err, BenchError::Malformed { .. }), "{}", err);
            assert!(result_files(&root).is_empty());
            assert!(observer.progress.is_empty());
            assert_eq!(adapter.calls.len(), 9);
            let _ = fs::remove_dir_all(root);
        }
    }

    #[test]
    fn latencies_jobs_validate_and_run_end_to_end() {
        let root = temp_root("latencies");
        let plan = small_plan_with(&root, Some(4), &[("duration", 2), ("latencies", 1)]);
        let mut adapter = ScriptedAdapter::new(|req, call| Ok(agreeing_response(req, call)));
        let mut observer = RecordingObserver::default();

        let summary = run_benchmark(&plan, &mut adapter, &mut observer).expect("run succeeds");
        assert_eq!(summary.jobs, 8);
        assert_eq!(summary.tasks, 2 * 2 * 2 * (2 + 1));
        assert_eq!(adapter.calls.len(), 8 * 2 + 24);
        assert_eq!(observer.validated[2].0, "mask::latencies::squares");

        let files = result_files(&root);
        assert_eq!(files.len(), 24);
        let record = fs::read_to_string(root.join("flow::latencies::car::kaer::0.json"))
            .expect("latencies record");
        assert!(record.contains("\"points\":[[5,"), "{}", record);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn latencies_response_without_points_fails_validation() {
        let root = temp_root("latencies_shape");
        let plan = small_plan_with(&root, Some(4), &[("latencies", 1)]);
        let mut adapter = ScriptedAdapter::new(|req, call| {
            if req.framework == "kaer" {
                return Ok(br#"{"duration":12,"hashes":{"events":73,"t_hash":"mask-squares"}}"#
                    .to_vec());
            }
            Ok(agreeing_response(req, call))
        });
        let err = run_benchmark(&plan, &mut adapter, &mut SilentObserver).expect_err("must abort");
        match err {
            BenchError::Malformed { framework, job, message } => {
                assert_eq!(framework, "kaer");
                assert_eq!(job, "mask::latencies::squares");
                assert!(message.contains("without 'points'"), "{}", message);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!root.exists());
    }

    #[test]
    fn rerun_overwrites_results_under_the_same_names() {
        let root = temp_root("rerun");
        let plan = small_plan(&root, None);
        let mut first = ScriptedAdapter::new(|req, call| Ok(agreeing_response(req, call)));
        run_benchmark(&plan, &mut first, &mut SilentObserver).expect("first run");
        let before = result_files(&root);

        let mut second = ScriptedAdapter::new(|req, call| {
            if call < 8 {
                return Ok(agreeing_response(req, call));
            }
            Ok(br#"{"duration":7,"hashes":{},"rerun":true}"#.to_vec())
        });
        run_benchmark(&plan, &mut second, &mut SilentObserver).expect("second run");
        let after = result_files(&root);
        assert_eq!(before, after);
        assert_eq!(after.len(), 16);
        for name in after {
            let body = fs::read_to_string(root.join(&name)).expect("read");
            assert!(body.contains("\"rerun\":true"), "{} kept a stale result", name);
        }
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn validation_runs_frameworks_in_order_before_execution() {
        let root = temp_root("order");
        let plan = small_plan(&root, Some(11));
        let mut adapter = ScriptedAdapter::new(|req, call| Ok(agreeing_response(req, call)));
        run_benchmark(&plan, &mut adapter, &mut SilentObserver).expect("run succeeds");
        assert_eq!(
            &adapter.calls[..4],
            &[
                "tarsier::mask::duration::squares",
                "kaer::mask::duration::squares",
                "tarsier::mask::duration::car",
                "kaer::mask::duration::car",
            ]
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn shuffle_is_a_permutation_and_seed_deterministic() {
        let root = temp_root("shuffle");
        let plan = small_plan(&root, None);
        let validate = || {
            let mut adapter = ScriptedAdapter::new(|req, call| Ok(agreeing_response(req, call)));
            validate_jobs(&plan.space, &mut adapter, &mut SilentObserver).expect("valid")
        };

        let before: Vec<Task> = validate().tasks().to_vec();
        let a = schedule(validate(), &mut StdRng::seed_from_u64(5)).into_tasks();
        let b = schedule(validate(), &mut StdRng::seed_from_u64(5)).into_tasks();
        let c = schedule(validate(), &mut StdRng::seed_from_u64(6)).into_tasks();

        assert_eq!(a, b, "same seed, same order");
        assert_ne!(a, c, "different seeds should reorder 16 tasks");
        assert_ne!(a, before, "shuffled order should differ from generation order");
        for shuffled in [&a, &c] {
            assert_eq!(shuffled.len(), before.len());
            let mut sorted_before = before.clone();
            let mut sorted_after = shuffled.clone();
            sorted_before.sort();
            sorted_after.sort();
            assert_eq!(sorted_before, sorted_after);
        }
        let names: HashSet<_> = a.iter().map(Task::name).collect();
        assert_eq!(names.len(), a.len());
    }

    #[test]
    fn shuffle_positions_are_roughly_uniform() {
        let root = temp_root("uniform");
        let plan = small_plan(&root, None);
        let mut adapter = ScriptedAdapter::new(|req, call| Ok(agreeing_response(req, call)));
        let validated =
            validate_jobs(&plan.space, &mut adapter, &mut SilentObserver).expect("valid");
        let first = validated.tasks()[0].clone();
        let n = validated.tasks().len();

        let mut rng = StdRng::seed_from_u64(2024);
        let trials = 16_000;
        let mut counts = vec![0usize; n];
        for _ in 0..trials {
            let order = schedule(validated.clone(), &mut rng);
            let position = order
                .tasks()
                .iter()
                .position(|t| *t == first)
                .expect("task survives the shuffle");
            counts[position] += 1;
        }
        let expected = trials / n;
        for (position, count) in counts.iter().enumerate() {
            assert!(
                count.abs_diff(expected) < expected / 4,
                "position {} seen {} times, expected about {}",
                position,
                count,
                expected
            );
        }
    }

    #[test]
    fn describe_reports_counts_without_running_anything() {
        let root = temp_root("describe");
        let plan = small_plan(&root, Some(8));
        let summary = describe_plan(&plan);
        assert_eq!(summary.jobs, 4);
        assert_eq!(summary.total_tasks, 16);
        assert_eq!(summary.reference_framework, "tarsier");
        assert_eq!(summary.experiments, vec![("duration".to_string(), 2)]);
        assert_eq!(summary.random_seed, Some(8));
        assert!(summary.digest.starts_with("sha256:"));
        assert!(!root.exists());
    }
}
