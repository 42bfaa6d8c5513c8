//! sshuttle command line construction and launch

use crate::config::Config;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SshuttleError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("sshuttle exited with {0}")]
    Failed(ExitStatus),
}

/// Subnets handed to sshuttle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    /// Route only these addresses
    Hosts(Vec<IpAddr>),
    /// Route everything
    All,
}

impl Targets {
    pub fn subnets(&self) -> Vec<String> {
        match self {
            Targets::Hosts(ips) => ips.iter().map(|ip| host_subnet(*ip)).collect(),
            Targets::All => vec!["0/0".to_string()],
        }
    }
}

/// Single-address subnet for an IP
pub fn host_subnet(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}/32", v4),
        IpAddr::V6(v6) => format!("{}/128", v6),
    }
}

/// Quote for sshuttle's shell-style split of `--ssh-cmd`
fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-~+=:@,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[derive(Debug, Clone)]
pub struct SshuttleCommand {
    program: String,
    remote: String,
    ssh_key: PathBuf,
    pid_file: PathBuf,
    dns: bool,
    targets: Targets,
}

impl SshuttleCommand {
    pub fn from_config(config: &Config, targets: Targets) -> Self {
        Self {
            program: config.tunnel.sshuttle_bin.clone(),
            remote: config.tunnel.remote.clone(),
            ssh_key: config.ssh_key_path(),
            pid_file: config.paths.pid_file.clone(),
            dns: config.tunnel.dns,
            targets,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--daemon".to_string(),
            "--pidfile".to_string(),
            self.pid_file.display().to_string(),
            "--remote".to_string(),
            self.remote.clone(),
            "--ssh-cmd".to_string(),
            format!("ssh -i {}", shell_quote(&self.ssh_key.display().to_string())),
        ];
        if self.dns {
            args.push("--dns".to_string());
        }
        args.extend(self.targets.subnets());
        args
    }

    /// Run sshuttle and wait for it to daemonize
    ///
    /// Stdio is inherited so sudo and ssh can prompt on the terminal.
    pub async fn run(&self) -> Result<(), SshuttleError> {
        let args = self.args();
        info!("Launching {} via {}", self.program, self.remote);
        debug!("{} {}", self.program, args.join(" "));

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| SshuttleError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if !status.success() {
            return Err(SshuttleError::Failed(status));
        }
        Ok(())
    }
}
