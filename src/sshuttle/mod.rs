//! sshuttle integration module
//!
//! sshuttle does the tunneling; this module only decides what to route
//! and tracks the daemon through its PID file.
//!
//! # Usage
//!
//! ```bash
//! sshuttle --daemon --pidfile /tmp/shuttle-vpn.pid \
//!   --remote user@bastion --ssh-cmd 'ssh -i ~/.ssh/id_ed25519' 10.0.0.1/32
//! ```

pub mod command;
pub mod control;
pub mod pidfile;

pub use command::{SshuttleCommand, SshuttleError, Targets};
pub use control::{ControlError, StartOutcome, StatusReport, StopOutcome, TunnelController};
pub use pidfile::{PidFile, PidFileError, TunnelState};
