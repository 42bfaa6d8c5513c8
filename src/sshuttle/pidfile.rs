//! sshuttle PID file inspection
//!
//! sshuttle writes the file itself when started with `--pidfile` and
//! removes it on a clean exit. A file left behind by a crash is detected by
//! probing the recorded PID.

use crate::platform::ProcessControl;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PidFileError {
    #[error("Failed to access PID file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("PID file {path} does not contain a PID: {content:?}")]
    Invalid { path: PathBuf, content: String },
}

/// What the PID file says about the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// File present and the process exists
    Running { pid: u32 },
    /// File present but the process is gone, or the file is unreadable garbage
    Stale { pid: Option<u32> },
    /// No file
    Stopped,
}

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the PID, or `None` if there is no file
    pub fn read(&self) -> Result<Option<u32>, PidFileError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PidFileError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        content
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| PidFileError::Invalid {
                path: self.path.clone(),
                content: content.trim().to_string(),
            })
    }

    pub fn state(&self, process: &dyn ProcessControl) -> Result<TunnelState, PidFileError> {
        match self.read() {
            Ok(None) => Ok(TunnelState::Stopped),
            Ok(Some(pid)) if process.is_alive(pid) => Ok(TunnelState::Running { pid }),
            Ok(Some(pid)) => Ok(TunnelState::Stale { pid: Some(pid) }),
            Err(PidFileError::Invalid { .. }) => Ok(TunnelState::Stale { pid: None }),
            Err(e) => Err(e),
        }
    }

    /// Delete the file. Returns false if it was already gone.
    pub fn remove(&self) -> Result<bool, PidFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PidFileError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}
