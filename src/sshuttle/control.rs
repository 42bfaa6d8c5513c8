//! Tunnel lifecycle: start, stop, status and cleanup
//!
//! # Start
//!
//! 1. Refuse if the PID file names a live process; drop it if stale
//! 2. Resolve configured hosts, append new addresses to the IP list
//! 3. Launch sshuttle for every address in the list
//!
//! # Stop
//!
//! 1. Read the PID file
//! 2. SIGTERM the process and wait for it to exit
//! 3. Remove the PID file if sshuttle left it behind

use crate::config::Config;
use crate::platform::{get_process_control, PlatformError, ProcessControl};
use crate::sshuttle::command::{SshuttleCommand, SshuttleError, Targets};
use crate::sshuttle::pidfile::{PidFile, PidFileError, TunnelState};
use crate::vpn::{HostResolver, IpList, IpListError};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("PID file error: {0}")]
    PidFile(#[from] PidFileError),
    #[error("IP list error: {0}")]
    IpList(#[from] IpListError),
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("sshuttle error: {0}")]
    Sshuttle(#[from] SshuttleError),
    #[error("No target addresses: none of the configured hosts resolved")]
    NoTargets,
    #[error("Process {0} did not exit after SIGTERM")]
    StopTimeout(u32),
}

#[derive(Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started {
        /// Addresses routed through the tunnel
        targets: Vec<IpAddr>,
        /// Addresses first seen on this run
        added: Vec<IpAddr>,
    },
    StartedAll,
    AlreadyRunning { pid: u32 },
}

#[derive(Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { pid: u32 },
    StaleRemoved { pid: Option<u32> },
    NotRunning,
}

#[derive(Debug)]
pub struct StatusReport {
    pub state: TunnelState,
    pub remote: String,
    pub pid_file: PathBuf,
    pub ip_file: PathBuf,
    pub ips: Vec<IpAddr>,
}

pub struct TunnelController {
    config: Config,
    process: Box<dyn ProcessControl>,
    stop_timeout: Duration,
}

impl TunnelController {
    pub fn new(config: Config) -> Result<Self, ControlError> {
        Ok(Self::with_process_control(config, get_process_control()?))
    }

    pub fn with_process_control(config: Config, process: Box<dyn ProcessControl>) -> Self {
        Self {
            config,
            process,
            stop_timeout: STOP_TIMEOUT,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn pid_file(&self) -> PidFile {
        PidFile::with_path(&self.config.paths.pid_file)
    }

    fn ip_list(&self) -> IpList {
        IpList::with_path(&self.config.paths.ip_file)
    }

    /// Returns the PID of a live tunnel, clearing a stale PID file on the way
    fn running_pid(&self) -> Result<Option<u32>, ControlError> {
        let pid_file = self.pid_file();
        match pid_file.state(self.process.as_ref())? {
            TunnelState::Running { pid } => Ok(Some(pid)),
            TunnelState::Stale { pid } => {
                warn!(
                    "Removing stale PID file {} (pid {:?})",
                    pid_file.path().display(),
                    pid
                );
                pid_file.remove()?;
                Ok(None)
            }
            TunnelState::Stopped => Ok(None),
        }
    }

    /// Route the configured hosts through the tunnel
    pub async fn start(&self) -> Result<StartOutcome, ControlError> {
        if let Some(pid) = self.running_pid()? {
            info!("Tunnel already running (pid {})", pid);
            return Ok(StartOutcome::AlreadyRunning { pid });
        }

        let resolver = HostResolver::new(self.config.tunnel.resolver);
        info!(
            "Resolving {} hosts via {:?}",
            self.config.hosts.len(),
            resolver.kind()
        );

        let ip_list = self.ip_list();
        let mut added = Vec::new();
        for resolution in resolver.resolve_all(&self.config.hosts).await {
            if let Ok(ips) = resolution.result {
                let new_ips = ip_list.extend(ips)?;
                debug!("{}: {} new addresses", resolution.hostname, new_ips.len());
                added.extend(new_ips);
            }
        }

        let targets = ip_list.entries()?;
        if targets.is_empty() {
            return Err(ControlError::NoTargets);
        }

        info!(
            "Routing {} addresses ({} new) through {}",
            targets.len(),
            added.len(),
            self.config.tunnel.remote
        );
        SshuttleCommand::from_config(&self.config, Targets::Hosts(targets.clone()))
            .run()
            .await?;

        Ok(StartOutcome::Started { targets, added })
    }

    /// Route all traffic through the tunnel
    pub async fn start_all(&self) -> Result<StartOutcome, ControlError> {
        if let Some(pid) = self.running_pid()? {
            info!("Tunnel already running (pid {})", pid);
            return Ok(StartOutcome::AlreadyRunning { pid });
        }

        info!("Routing all traffic through {}", self.config.tunnel.remote);
        SshuttleCommand::from_config(&self.config, Targets::All)
            .run()
            .await?;

        Ok(StartOutcome::StartedAll)
    }

    pub async fn stop(&self) -> Result<StopOutcome, ControlError> {
        let pid_file = self.pid_file();
        let pid = match pid_file.state(self.process.as_ref())? {
            TunnelState::Stopped => {
                info!("No PID file at {}", pid_file.path().display());
                return Ok(StopOutcome::NotRunning);
            }
            TunnelState::Stale { pid } => {
                warn!("Process {:?} already gone, removing PID file", pid);
                pid_file.remove()?;
                return Ok(StopOutcome::StaleRemoved { pid });
            }
            TunnelState::Running { pid } => pid,
        };

        info!("Stopping sshuttle (pid {})", pid);
        match self.process.terminate(pid) {
            Ok(()) => {}
            Err(PlatformError::ProcessNotFound(_)) => {
                // Exited between the liveness check and the signal
                pid_file.remove()?;
                return Ok(StopOutcome::StaleRemoved { pid: Some(pid) });
            }
            Err(e) => return Err(e.into()),
        }

        self.wait_for_exit(pid).await?;

        if pid_file.remove()? {
            debug!("Removed leftover PID file {}", pid_file.path().display());
        }
        info!("Tunnel stopped");
        Ok(StopOutcome::Stopped { pid })
    }

    async fn wait_for_exit(&self, pid: u32) -> Result<(), ControlError> {
        let deadline = tokio::time::Instant::now() + self.stop_timeout;
        while self.process.is_alive(pid) {
            if tokio::time::Instant::now() >= deadline {
                return Err(ControlError::StopTimeout(pid));
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
        Ok(())
    }

    pub async fn restart(&self) -> Result<StartOutcome, ControlError> {
        let stopped = self.stop().await?;
        debug!("Restart: {:?}", stopped);
        self.start().await
    }

    pub fn status(&self) -> Result<StatusReport, ControlError> {
        let pid_file = self.pid_file();
        let ip_list = self.ip_list();
        Ok(StatusReport {
            state: pid_file.state(self.process.as_ref())?,
            remote: self.config.tunnel.remote.clone(),
            pid_file: pid_file.path().to_path_buf(),
            ip_file: ip_list.path().to_path_buf(),
            ips: ip_list.entries()?,
        })
    }

    /// Delete the IP list. Returns false if there was none.
    pub fn cleanup(&self) -> Result<bool, ControlError> {
        if let Some(pid) = self.pid_file().read().ok().flatten() {
            if self.process.is_alive(pid) {
                warn!("Tunnel still running (pid {}); current routes stay until restart", pid);
            }
        }

        let ip_list = self.ip_list();
        let removed = ip_list.remove()?;
        if removed {
            info!("Removed {}", ip_list.path().display());
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Process table with a set of live PIDs; SIGTERM kills unless `stubborn`
    struct FakeProcesses {
        alive: Mutex<Vec<u32>>,
        stubborn: bool,
    }

    impl FakeProcesses {
        fn new(alive: &[u32]) -> Box<Self> {
            Box::new(Self {
                alive: Mutex::new(alive.to_vec()),
                stubborn: false,
            })
        }
    }

    impl ProcessControl for FakeProcesses {
        fn is_alive(&self, pid: u32) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }

        fn terminate(&self, pid: u32) -> Result<(), PlatformError> {
            let mut alive = self.alive.lock().unwrap();
            if !alive.contains(&pid) {
                return Err(PlatformError::ProcessNotFound(pid));
            }
            if !self.stubborn {
                alive.retain(|p| *p != pid);
            }
            Ok(())
        }
    }

    fn test_config(temp_dir: &TempDir, hosts: &[&str], sshuttle_bin: &str) -> Config {
        let mut config = Config::default();
        config.hosts = hosts.iter().map(|h| h.to_string()).collect();
        config.tunnel.sshuttle_bin = sshuttle_bin.to_string();
        config.paths.ip_file = temp_dir.path().join("ips");
        config.paths.pid_file = temp_dir.path().join("pid");
        config
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_start_records_and_routes_addresses() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, &["10.0.0.1", "10.0.0.2"], "true");
        let controller = TunnelController::with_process_control(config, FakeProcesses::new(&[]));

        let outcome = controller.start().await.unwrap();

        assert_eq!(
            outcome,
            StartOutcome::Started {
                targets: vec![ip("10.0.0.1"), ip("10.0.0.2")],
                added: vec![ip("10.0.0.1"), ip("10.0.0.2")],
            }
        );
        let content = std::fs::read_to_string(temp_dir.path().join("ips")).unwrap();
        assert_eq!(content, "10.0.0.1\n10.0.0.2\n");
    }

    #[tokio::test]
    async fn test_start_keeps_previous_addresses() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("ips"), "10.9.9.9\n10.0.0.1\n").unwrap();
        let config = test_config(&temp_dir, &["10.0.0.1"], "true");
        let controller = TunnelController::with_process_control(config, FakeProcesses::new(&[]));

        let outcome = controller.start().await.unwrap();

        assert_eq!(
            outcome,
            StartOutcome::Started {
                targets: vec![ip("10.9.9.9"), ip("10.0.0.1")],
                added: vec![],
            }
        );
    }

    #[tokio::test]
    async fn test_start_when_running_does_nothing() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("pid"), "4242\n").unwrap();
        let config = test_config(&temp_dir, &["10.0.0.1"], "false");
        let controller =
            TunnelController::with_process_control(config, FakeProcesses::new(&[4242]));

        let outcome = controller.start().await.unwrap();

        assert_eq!(outcome, StartOutcome::AlreadyRunning { pid: 4242 });
        assert!(!temp_dir.path().join("ips").exists());
    }

    #[tokio::test]
    async fn test_start_clears_stale_pid_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("pid"), "4242\n").unwrap();
        let config = test_config(&temp_dir, &[], "true");
        let controller = TunnelController::with_process_control(config, FakeProcesses::new(&[]));

        let outcome = controller.start_all().await.unwrap();

        assert_eq!(outcome, StartOutcome::StartedAll);
        assert!(!temp_dir.path().join("pid").exists());
    }

    #[tokio::test]
    async fn test_start_without_targets_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, &[], "true");
        let controller = TunnelController::with_process_control(config, FakeProcesses::new(&[]));

        let result = controller.start().await;
        assert!(matches!(result, Err(ControlError::NoTargets)));
    }

    #[tokio::test]
    async fn test_start_propagates_sshuttle_failure() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, &["10.0.0.1"], "false");
        let controller = TunnelController::with_process_control(config, FakeProcesses::new(&[]));

        let result = controller.start().await;

        assert!(matches!(
            result,
            Err(ControlError::Sshuttle(SshuttleError::Failed(_)))
        ));
        // Addresses are recorded before the launch
        assert!(temp_dir.path().join("ips").exists());
    }

    #[tokio::test]
    async fn test_stop_not_running() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, &[], "true");
        let controller = TunnelController::with_process_control(config, FakeProcesses::new(&[]));

        assert_eq!(controller.stop().await.unwrap(), StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn test_stop_running() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("pid"), "4242\n").unwrap();
        let config = test_config(&temp_dir, &[], "true");
        let controller =
            TunnelController::with_process_control(config, FakeProcesses::new(&[4242]));

        assert_eq!(
            controller.stop().await.unwrap(),
            StopOutcome::Stopped { pid: 4242 }
        );
        assert!(!temp_dir.path().join("pid").exists());
    }

    #[tokio::test]
    async fn test_stop_stale() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("pid"), "garbage").unwrap();
        let config = test_config(&temp_dir, &[], "true");
        let controller = TunnelController::with_process_control(config, FakeProcesses::new(&[]));

        assert_eq!(
            controller.stop().await.unwrap(),
            StopOutcome::StaleRemoved { pid: None }
        );
        assert!(!temp_dir.path().join("pid").exists());
    }

    #[tokio::test]
    async fn test_stop_timeout_keeps_pid_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("pid"), "4242\n").unwrap();
        let config = test_config(&temp_dir, &[], "true");
        let process = Box::new(FakeProcesses {
            alive: Mutex::new(vec![4242]),
            stubborn: true,
        });
        let mut controller = TunnelController::with_process_control(config, process);
        controller.stop_timeout = Duration::from_millis(250);

        let result = controller.stop().await;

        assert!(matches!(result, Err(ControlError::StopTimeout(4242))));
        assert!(temp_dir.path().join("pid").exists());
    }

    #[tokio::test]
    async fn test_restart_when_stopped_starts() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, &["10.0.0.7"], "true");
        let controller = TunnelController::with_process_control(config, FakeProcesses::new(&[]));

        let outcome = controller.restart().await.unwrap();
        assert!(matches!(outcome, StartOutcome::Started { .. }));
    }

    #[test]
    fn test_status_and_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("ips"), "10.0.0.1\n").unwrap();
        std::fs::write(temp_dir.path().join("pid"), "4242\n").unwrap();
        let config = test_config(&temp_dir, &[], "true");
        let controller =
            TunnelController::with_process_control(config, FakeProcesses::new(&[4242]));

        let report = controller.status().unwrap();
        assert_eq!(report.state, TunnelState::Running { pid: 4242 });
        assert_eq!(report.ips, vec![ip("10.0.0.1")]);

        assert!(controller.cleanup().unwrap());
        assert!(!controller.cleanup().unwrap());
        assert!(controller.status().unwrap().ips.is_empty());
    }
}
