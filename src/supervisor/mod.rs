//! Process supervisor
//!
//! Launches the long-running workers as separate processes, fires the price
//! job on its schedule and otherwise idles until a termination signal.
//!
//! ```text
//! Init ──> LaunchingWorkers ──> Scheduling ──> Idling ──(signal)──> stop workers
//! ```
//!
//! Workers that exit are reported in the log but are not restarted.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SupervisorConfig;
use crate::util::Shutdown;

pub mod launcher;
pub mod schedule;

pub use launcher::{
    LaunchError, LaunchMode, LaunchOutcome, LaunchSpec, Worker, launch, resolve_executable,
    run_job,
};
pub use schedule::PriceSchedule;

/// The worker processes the supervisor knows how to start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Devices,
    Health,
    Prices,
    Mqtt,
}

impl WorkerKind {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerKind::Devices => "devices",
            WorkerKind::Health => "health",
            WorkerKind::Prices => "prices",
            WorkerKind::Mqtt => "mqtt",
        }
    }

    /// File name of the worker's executable, without platform suffix
    pub fn binary_name(&self) -> String {
        format!("gridwatch-{}", self.name())
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Init,
    LaunchingWorkers,
    Scheduling,
    Idling,
}

/// How long a background worker must survive to count as started
const LAUNCH_GRACE: Duration = Duration::from_millis(500);

/// How long a stopped worker gets to exit
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Supervisor {
    config: SupervisorConfig,
    config_path: PathBuf,
    search_dir: PathBuf,
    launch_grace: Duration,
    state: SupervisorState,
    schedule: Option<PriceSchedule>,
    workers: Vec<Worker>,
    job: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// `config_path` is forwarded to every worker; executables are looked up
    /// in `search_dir` unless configured explicitly
    pub fn new(config: SupervisorConfig, config_path: PathBuf, search_dir: PathBuf) -> Self {
        Self {
            config,
            config_path,
            search_dir,
            launch_grace: LAUNCH_GRACE,
            state: SupervisorState::Init,
            schedule: None,
            workers: vec![],
            job: None,
        }
    }

    pub fn with_launch_grace(mut self, grace: Duration) -> Self {
        self.launch_grace = grace;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    fn spec(&self, kind: WorkerKind, mode: LaunchMode) -> Result<LaunchSpec, LaunchError> {
        let program =
            resolve_executable(kind, self.config.executables.get(kind), &self.search_dir)?;
        Ok(LaunchSpec::worker(kind, program, &self.config_path, mode))
    }

    /// Start every configured worker; a worker that fails does not stop the others
    #[instrument(skip_all)]
    pub async fn launch_workers(&mut self) {
        self.state = SupervisorState::LaunchingWorkers;

        for kind in self.config.workers.clone() {
            if kind == WorkerKind::Prices {
                warn!("prices runs on its schedule, not as a background worker");
                continue;
            }

            let spec = match self.spec(kind, LaunchMode::Background) {
                Ok(spec) => spec,
                Err(e) => {
                    error!("{kind}: {e}");
                    continue;
                }
            };

            match launch(&spec, self.launch_grace).await {
                Ok((_, Some(worker))) => self.workers.push(worker),
                Ok((_, None)) => {}
                Err(e) => error!("{kind}: {e}"),
            }
        }
    }

    /// Parse the price schedule
    pub fn install_schedule(&mut self) -> anyhow::Result<()> {
        self.state = SupervisorState::Scheduling;

        let schedule = PriceSchedule::parse(&self.config.price_schedule)?;
        match schedule.next_after(&Local::now()) {
            Some(next) => info!("price job scheduled ({}), next run at {next}", schedule.expression()),
            None => warn!("price schedule ({}) never fires", schedule.expression()),
        }
        self.schedule = Some(schedule);

        Ok(())
    }

    fn fire_price_job(&mut self) {
        if self.job.as_ref().is_some_and(|job| !job.is_finished()) {
            warn!("previous price job still running, skipping this trigger");
            return;
        }

        let spec = match self.spec(WorkerKind::Prices, LaunchMode::Foreground) {
            Ok(spec) => spec,
            Err(e) => {
                error!("prices: {e}");
                return;
            }
        };

        self.job = Some(tokio::spawn(async move {
            if let Err(e) = run_job(&spec).await {
                error!("prices: {e}");
            }
        }));
    }

    /// Log and forget every worker that has exited
    pub fn reap_exited(&mut self) {
        self.workers.retain_mut(|worker| match worker.exited() {
            Some(code) => {
                error!(
                    "{} (pid {}) exited with code {code}, not restarting",
                    worker.kind, worker.pid
                );
                false
            }
            None => true,
        });
    }

    fn next_fire(&self) -> Option<DateTime<Local>> {
        self.schedule
            .as_ref()
            .and_then(|schedule| schedule.next_after(&Local::now()))
    }

    /// Idle until shutdown, waking for the schedule and every idle interval
    pub async fn idle(&mut self, shutdown: &mut Shutdown) {
        self.state = SupervisorState::Idling;
        let idle_interval = Duration::from_secs(self.config.idle_interval.max(1));
        let mut next_fire = self.next_fire();

        loop {
            if next_fire.is_some_and(|at| at <= Local::now()) {
                self.fire_price_job();
                next_fire = self.next_fire();
            }

            self.reap_exited();

            let wait = next_fire
                .and_then(|at| (at - Local::now()).to_std().ok())
                .map_or(idle_interval, |until| until.min(idle_interval));
            debug!("idling for {wait:?}");

            if !shutdown.sleep(wait).await {
                break;
            }
        }
    }

    /// Stop everything the supervisor started
    pub async fn stop(&mut self) {
        if let Some(job) = self.job.take() {
            job.abort();
        }

        for worker in self.workers.drain(..) {
            worker.stop(STOP_TIMEOUT).await;
        }
    }

    /// Walk the whole state machine until shutdown
    pub async fn run(mut self, mut shutdown: Shutdown) -> anyhow::Result<()> {
        info!("starting workers from {}", self.search_dir.display());
        self.launch_workers().await;
        info!("{} worker(s) running", self.workers.len());

        if let Err(e) = self.install_schedule() {
            self.stop().await;
            return Err(e);
        }

        self.idle(&mut shutdown).await;

        info!("shutting down");
        self.stop().await;
        Ok(())
    }
}

/// Directory of the running executable
pub fn executable_dir() -> anyhow::Result<PathBuf> {
    let current = std::env::current_exe()?;
    Ok(current
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}
