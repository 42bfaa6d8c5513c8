//! shuttle-vpn - split-tunnel wrapper around sshuttle
//!
//! Resolves a fixed list of hostnames, remembers every address they have
//! resolved to, and hands those addresses to sshuttle so only that traffic
//! goes over SSH.
//!
//! # Architecture
//!
//! - `config`: Configuration file handling (TOML)
//! - `platform`: Process signalling (Unix)
//! - `vpn`: Hostname resolution and the persisted IP list
//! - `sshuttle`: sshuttle invocation, PID file, lifecycle commands
//! - `probe`: HTTP reachability checks
//!
//! # Usage
//!
//! ```bash
//! shuttle-vpn start
//! shuttle-vpn test git.example.com
//! shuttle-vpn stop
//! ```

pub mod config;
pub mod platform;
pub mod probe;
pub mod sshuttle;
pub mod vpn;

pub use config::Config;
pub use probe::{Prober, Reachability};
pub use sshuttle::TunnelController;
