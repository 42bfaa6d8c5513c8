//! Platform-specific process control

#[cfg(unix)]
pub mod unix;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Process {0} not found")]
    ProcessNotFound(u32),
    #[error("Failed to signal process {pid}: {message}")]
    SignalError { pid: u32, message: String },
    #[error("Unsupported platform")]
    UnsupportedPlatform,
}

/// Platform-agnostic view of another process
pub trait ProcessControl: Send + Sync {
    /// Whether a process with this PID exists
    fn is_alive(&self, pid: u32) -> bool;
    /// Ask the process to exit
    fn terminate(&self, pid: u32) -> Result<(), PlatformError>;
}

/// Get the appropriate process controller for the current platform
pub fn get_process_control() -> Result<Box<dyn ProcessControl>, PlatformError> {
    #[cfg(unix)]
    {
        Ok(Box::new(unix::UnixProcessControl::new()))
    }

    #[cfg(not(unix))]
    {
        Err(PlatformError::UnsupportedPlatform)
    }
}
