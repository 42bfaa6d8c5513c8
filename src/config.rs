//! Configuration handling for shuttle-vpn
//!
//! Every value has a compiled-in default. A TOML file can override them; see
//! [`Config::discover`] for the search order.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "shuttle-vpn.toml";

/// Fixed home of the PID file and IP list. Not `temp_dir()`: `TMPDIR`
/// differs between users and under sudo, and every invocation must agree.
#[cfg(unix)]
const STATE_DIR: &str = "/tmp";
#[cfg(not(unix))]
const STATE_DIR: &str = r"C:\Windows\Temp";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How hostnames are turned into addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// The operating system resolver
    System,
    /// `dig +short`
    #[default]
    Dig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub hosts: Vec<String>,
    pub tunnel: TunnelConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// `[user@]host[:port]` handed to `sshuttle --remote`
    pub remote: String,
    pub ssh_key: PathBuf,
    #[serde(default = "default_sshuttle_bin")]
    pub sshuttle_bin: String,
    /// Forward DNS queries through the tunnel as well
    #[serde(default)]
    pub dns: bool,
    #[serde(default)]
    pub resolver: ResolverKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    pub ip_file: PathBuf,
    pub pid_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
}

fn default_sshuttle_bin() -> String {
    "sshuttle".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        let tmp = Path::new(STATE_DIR);
        Self {
            ip_file: tmp.join("shuttle-vpn.ips"),
            pid_file: tmp.join("shuttle-vpn.pid"),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hosts: vec![
                "intranet.example.com".to_string(),
                "git.example.com".to_string(),
                "jenkins.example.com".to_string(),
            ],
            tunnel: TunnelConfig {
                remote: "jump@bastion.example.com".to_string(),
                ssh_key: PathBuf::from("~/.ssh/id_ed25519"),
                sshuttle_bin: default_sshuttle_bin(),
                dns: false,
                resolver: ResolverKind::default(),
            },
            paths: PathsConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load config from an explicit path, or from the default locations
    ///
    /// Search order without an explicit path:
    /// 1. `./shuttle-vpn.toml`
    /// 2. `~/.shuttle-vpn/config.toml`
    /// 3. compiled-in defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            return Self::load(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            debug!("Loading config from {}", local_config.display());
            return Self::load(&local_config);
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".shuttle-vpn").join("config.toml");
            if home_config.exists() {
                debug!("Loading config from {}", home_config.display());
                return Self::load(&home_config);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tunnel.remote.trim().is_empty() {
            return Err(ConfigError::Invalid("tunnel.remote cannot be empty".into()));
        }
        if let Some(host) = self.hosts.iter().find(|h| h.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "hosts contains an empty entry: {:?}",
                host
            )));
        }
        if self.probe.timeout_secs == 0 {
            return Err(ConfigError::Invalid("probe.timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    /// SSH key path with a leading `~/` expanded
    pub fn ssh_key_path(&self) -> PathBuf {
        expand_home(&self.tunnel.ssh_key)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
