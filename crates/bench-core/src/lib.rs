//! Domain values shared by the benchmark runner and CLI.

mod error;
mod files;
mod job;
mod metrics;
mod response;
mod timing;

pub use error::CoreError;
pub use files::{atomic_write_bytes, canonical_json_digest, ensure_dir, sha256_bytes};
pub use job::{Experiment, ExperimentKind, Job, JobSpace, Task, TaskName, NAME_SEPARATOR};
pub use metrics::MetricsMapping;
pub use response::{AdapterResponse, LatencyPoint};
pub use timing::{duration, latencies, normalize, parse_timestamp};
