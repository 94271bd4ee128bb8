use crate::plan::stream_file;
use crate::{BenchError, ResolvedPlan, Result};
use bench_core::{ExperimentKind, Job};
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// One adapter call: run `job` under `framework`.
#[derive(Debug, Clone, Copy)]
pub struct AdapterRequest<'a> {
    pub framework: &'a str,
    pub pipeline: &'a str,
    pub experiment: ExperimentKind,
    pub stream: &'a str,
}

impl<'a> AdapterRequest<'a> {
    pub fn for_job(framework: &'a str, job: &'a Job) -> Self {
        Self {
            framework,
            pipeline: &job.pipeline,
            experiment: job.experiment,
            stream: &job.stream,
        }
    }
}

/// A blocking call into a framework's adapter.
///
/// Implementations return the adapter's standard output verbatim once it has
/// exited successfully. Calls never overlap: the runner waits for each one to
/// return before making the next.
pub trait Adapter {
    fn invoke(&mut self, request: &AdapterRequest<'_>) -> Result<Vec<u8>>;
}

/// Runs `<command...> <pipeline> <experiment> <stream path>` for each call.
#[derive(Debug, Clone)]
pub struct ProcessAdapter {
    commands: BTreeMap<String, Vec<String>>,
    media_dir: PathBuf,
    stream_extension: String,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessAdapter {
    pub fn new(
        commands: BTreeMap<String, Vec<String>>,
        media_dir: PathBuf,
        stream_extension: String,
        working_dir: PathBuf,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            commands,
            media_dir,
            stream_extension,
            working_dir,
            timeout,
        }
    }

    pub fn from_plan(plan: &ResolvedPlan) -> Self {
        Self::new(
            plan.commands.clone(),
            plan.media_dir.clone(),
            plan.stream_extension.clone(),
            plan.plan_dir.clone(),
            plan.adapter_timeout,
        )
    }

    fn argv(&self, request: &AdapterRequest<'_>) -> Result<Vec<String>> {
        let command = self
            .commands
            .get(request.framework)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| BenchError::Spawn {
                framework: request.framework.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no command configured"),
            })?;
        let stream = stream_file(&self.media_dir, &self.stream_extension, request.stream);
        let mut argv = command.clone();
        argv.push(request.pipeline.to_string());
        argv.push(request.experiment.as_str().to_string());
        argv.push(stream.to_string_lossy().to_string());
        Ok(argv)
    }
}

impl Adapter for ProcessAdapter {
    fn invoke(&mut self, request: &AdapterRequest<'_>) -> Result<Vec<u8>> {
        let argv = self.argv(request)?;
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        cmd.current_dir(&self.working_dir);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());

        let started = Instant::now();
        let child = cmd.spawn().map_err(|source| BenchError::Spawn {
            framework: request.framework.to_string(),
            source,
        })?;
        let (status, stdout) = match self.timeout {
            None => {
                let output = child.wait_with_output()?;
                (output.status, output.stdout)
            }
            Some(limit) => wait_with_deadline(child, limit).map_err(|e| match e {
                WaitError::TimedOut => BenchError::Timeout {
                    framework: request.framework.to_string(),
                    command: shell_join(&argv),
                    seconds: limit.as_secs(),
                },
                WaitError::Io(e) => BenchError::Io(e),
            })?,
        };
        debug!(
            framework = request.framework,
            command = %shell_join(&argv),
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = stdout.len(),
            "adapter returned"
        );

        if !status.success() {
            return Err(BenchError::AdapterFailed {
                framework: request.framework.to_string(),
                command: shell_join(&argv),
                status: status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
            });
        }
        Ok(stdout)
    }
}

enum WaitError {
    TimedOut,
    Io(io::Error),
}

impl From<io::Error> for WaitError {
    fn from(e: io::Error) -> Self {
        WaitError::Io(e)
    }
}

/// Drains stdout on a helper thread so a chatty adapter cannot fill the pipe
/// while the deadline is polled. The deadline covers both the child's exit
/// and end-of-file on stdout, which a process the adapter left running in
/// the background can hold open. On timeout the child is killed and the
/// reader is left to finish once every holder of the pipe has exited.
fn wait_with_deadline(
    mut child: Child,
    limit: Duration,
) -> std::result::Result<(ExitStatus, Vec<u8>), WaitError> {
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "adapter stdout not captured"))?;
    let reader = thread::spawn(move || -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf)?;
        Ok(buf)
    });

    let deadline = Instant::now() + limit;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WaitError::TimedOut);
        }
        thread::sleep(Duration::from_millis(20));
    };

    while !reader.is_finished() {
        if Instant::now() >= deadline {
            return Err(WaitError::TimedOut);
        }
        thread::sleep(Duration::from_millis(20));
    }
    let stdout = reader
        .join()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "adapter stdout reader panicked"))??;
    Ok((status, stdout))
}

fn shell_join(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:=".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}
