//! Starting worker processes, in the background or as a foreground job.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use super::WorkerKind;

#[derive(Debug)]
pub enum LaunchError {
    /// No executable at the resolved path
    NotFound(PathBuf),
    /// The OS refused to start the process
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    /// Waiting on a started process failed
    Wait(std::io::Error),
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::NotFound(path) => write!(f, "executable not found: {}", path.display()),
            LaunchError::Spawn { program, source } => {
                write!(f, "could not start {}: {source}", program.display())
            }
            LaunchError::Wait(e) => write!(f, "could not wait for process: {e}"),
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaunchError::Spawn { source, .. } => Some(source),
            LaunchError::Wait(e) => Some(e),
            LaunchError::NotFound(_) => None,
        }
    }
}

/// Find the executable of a worker
///
/// An explicit path wins; otherwise the worker's binary is expected next to
/// `search_dir` (the supervisor's own directory).
pub fn resolve_executable(
    kind: WorkerKind,
    explicit: Option<&Path>,
    search_dir: &Path,
) -> Result<PathBuf, LaunchError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => search_dir.join(format!(
            "{}{}",
            kind.binary_name(),
            std::env::consts::EXE_SUFFIX
        )),
    };

    if path.is_file() {
        Ok(path)
    } else {
        Err(LaunchError::NotFound(path))
    }
}

/// How a launch is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Long-running worker: success means still running after the grace period
    Background,
    /// One-shot job: success means it completed with exit code 0
    Foreground,
}

/// State of a process right after launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Running { pid: u32 },
    Completed { code: i32 },
}

impl LaunchOutcome {
    pub fn is_success(&self, mode: LaunchMode) -> bool {
        match (mode, self) {
            (LaunchMode::Background, LaunchOutcome::Running { .. }) => true,
            (LaunchMode::Foreground, LaunchOutcome::Completed { code }) => *code == 0,
            _ => false,
        }
    }
}

/// Everything needed to start one process
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub kind: WorkerKind,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub mode: LaunchMode,
}

impl LaunchSpec {
    /// A worker reading the same configuration file as the supervisor
    pub fn worker(kind: WorkerKind, program: PathBuf, config: &Path, mode: LaunchMode) -> Self {
        Self {
            kind,
            program,
            args: vec![String::from("-f"), config.display().to_string()],
            mode,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null());
        command
    }
}

/// A background process started by the supervisor
#[derive(Debug)]
pub struct Worker {
    pub kind: WorkerKind,
    pub pid: u32,
    child: Child,
}

impl Worker {
    /// Exit code if the process has ended since the last check
    pub fn exited(&mut self) -> Option<i32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.code().unwrap_or(-1)),
            Ok(None) => None,
            Err(e) => {
                warn!("{}: could not query process {}: {e}", self.kind, self.pid);
                None
            }
        }
    }

    /// Kill the process and reap it
    pub async fn stop(mut self, timeout: Duration) {
        if let Err(e) = self.child.start_kill() {
            debug!("{}: kill: {e}", self.kind);
        }
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => info!("{} (pid {}) stopped: {status}", self.kind, self.pid),
            Ok(Err(e)) => warn!("{}: could not reap process {}: {e}", self.kind, self.pid),
            Err(_) => warn!("{}: process {} did not stop in time", self.kind, self.pid),
        }
    }
}

/// Start a background worker and check it is still alive after `grace`
///
/// A worker that already exited is returned as `Completed`, which counts as
/// a failed launch. The launch is never retried.
pub async fn launch(
    spec: &LaunchSpec,
    grace: Duration,
) -> Result<(LaunchOutcome, Option<Worker>), LaunchError> {
    let mut child = spec.command().spawn().map_err(|source| LaunchError::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    let pid = child.id().unwrap_or_default();

    let outcome = match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => LaunchOutcome::Completed {
            code: status.code().unwrap_or(-1),
        },
        Ok(Err(e)) => return Err(LaunchError::Wait(e)),
        Err(_) => LaunchOutcome::Running { pid },
    };

    if outcome.is_success(spec.mode) {
        info!("{} started (pid {pid})", spec.kind);
    } else {
        error!("{} failed to start: {outcome:?}", spec.kind);
    }

    let worker = matches!(outcome, LaunchOutcome::Running { .. }).then_some(Worker {
        kind: spec.kind,
        pid,
        child,
    });

    Ok((outcome, worker))
}

/// Run a one-shot job to completion and report its exit code
pub async fn run_job(spec: &LaunchSpec) -> Result<LaunchOutcome, LaunchError> {
    let mut command = spec.command();
    command.kill_on_drop(true);

    info!("running {}", spec.kind);
    let status = command
        .status()
        .await
        .map_err(|source| LaunchError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

    let outcome = LaunchOutcome::Completed {
        code: status.code().unwrap_or(-1),
    };

    if outcome.is_success(LaunchMode::Foreground) {
        info!("{} finished: {status}", spec.kind);
    } else {
        error!("{} failed: {status}", spec.kind);
    }

    Ok(outcome)
}
