//! Unix process control via signals

use super::{PlatformError, ProcessControl};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

pub struct UnixProcessControl;

impl UnixProcessControl {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UnixProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

fn to_pid(pid: u32) -> Option<Pid> {
    // PIDs 0 and -1 would signal a whole process group
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

impl ProcessControl for UnixProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        let Some(target) = to_pid(pid) else {
            return false;
        };
        // EPERM means the process exists but belongs to someone else (root)
        matches!(kill(target, None), Ok(()) | Err(Errno::EPERM))
    }

    fn terminate(&self, pid: u32) -> Result<(), PlatformError> {
        let target = to_pid(pid).ok_or(PlatformError::ProcessNotFound(pid))?;
        match kill(target, Signal::SIGTERM) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(PlatformError::ProcessNotFound(pid)),
            Err(e) => Err(PlatformError::SignalError {
                pid,
                message: e.desc().to_string(),
            }),
        }
    }
}
