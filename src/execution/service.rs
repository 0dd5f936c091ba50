//! Background service supervision and readiness probing

use std::path::Path;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::TcpStream;
use tracing::warn;

use crate::core::step::{ReadinessCheck, ReadinessProbe};
use crate::shell::ServiceProcess;

/// Poll interval between readiness checks
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Why a readiness wait ended unsuccessfully
#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("service exited with code {code} before becoming ready (log: {log})")]
    ExitedEarly { code: i32, log: String },

    #[error("service not ready after {secs} seconds")]
    TimedOut { secs: u64 },
}

/// Wait until the probe is satisfied or the service dies
///
/// Polls every 250ms; a service that exits while the probe waits fails the
/// wait immediately. Returns how long readiness took.
pub async fn wait_ready(
    probe: &ReadinessProbe,
    service: &mut dyn ServiceProcess,
    workspace_root: &Path,
    log_path: &Path,
) -> Result<Duration, ReadinessError> {
    let started = Instant::now();

    // A plain delay has no condition to poll.
    if let ReadinessCheck::Delay(delay) = probe.check {
        tokio::time::sleep(delay).await;
        if let Some(code) = poll(service) {
            return Err(exited_early(code, log_path));
        }
        return Ok(started.elapsed());
    }

    loop {
        if let Some(code) = poll(service) {
            return Err(exited_early(code, log_path));
        }

        if check_once(&probe.check, workspace_root, log_path).await {
            return Ok(started.elapsed());
        }

        if started.elapsed() >= probe.timeout {
            return Err(ReadinessError::TimedOut {
                secs: probe.timeout.as_secs(),
            });
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn poll(service: &mut dyn ServiceProcess) -> Option<i32> {
    match service.poll_exit() {
        Ok(exit) => exit,
        Err(e) => {
            warn!("could not poll service: {}", e);
            None
        }
    }
}

fn exited_early(code: i32, log_path: &Path) -> ReadinessError {
    ReadinessError::ExitedEarly {
        code,
        log: log_path.display().to_string(),
    }
}

async fn check_once(check: &ReadinessCheck, workspace_root: &Path, log_path: &Path) -> bool {
    match check {
        ReadinessCheck::Port(port) => TcpStream::connect(("127.0.0.1", *port)).await.is_ok(),
        ReadinessCheck::PathExists(path) => workspace_root.join(path).exists(),
        ReadinessCheck::LogMatch(pattern) => match tokio::fs::read_to_string(log_path).await {
            Ok(content) => pattern.matches(&content),
            Err(_) => false,
        },
        ReadinessCheck::Delay(_) => true,
    }
}

/// Services launched during a run
///
/// The run shuts them down in reverse launch order once every step
/// reached a terminal state, success or failure alike.
#[derive(Default)]
pub struct ServiceSet {
    services: Vec<LaunchedService>,
}

struct LaunchedService {
    step_id: String,
    process: Box<dyn ServiceProcess>,
}

impl ServiceSet {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
        }
    }

    pub fn push(&mut self, step_id: String, process: Box<dyn ServiceProcess>) {
        self.services.push(LaunchedService { step_id, process });
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Kill and reap every service, newest first
    ///
    /// Returns `(step_id, natural_exit)` per service, where `natural_exit`
    /// is the exit code of a service that had already died on its own.
    pub async fn shutdown_all(&mut self) -> Vec<(String, Option<i32>)> {
        let mut stopped = Vec::new();
        while let Some(mut service) = self.services.pop() {
            let natural_exit = match service.process.poll_exit() {
                Ok(exit) => exit,
                Err(_) => None,
            };
            if let Err(e) = service.process.shutdown().await {
                warn!("failed to stop service {}: {}", service.step_id, e);
            }
            stopped.push((service.step_id, natural_exit));
        }
        stopped
    }
}
