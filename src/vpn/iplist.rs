//! Persisted list of tunnel target addresses
//!
//! One address per line, append-only. Addresses discovered on earlier runs
//! stay in the file so that hosts behind rotating DNS keep all their
//! routes. The only way to shrink the list is to delete the file.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum IpListError {
    #[error("Failed to access IP list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct IpList {
    path: PathBuf,
}

impl IpList {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// All addresses in file order; a missing file is an empty list
    pub fn entries(&self) -> Result<Vec<IpAddr>, IpListError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse_entries(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Append `ip` unless it is already listed. Returns whether it was added.
    pub fn insert(&self, ip: IpAddr) -> Result<bool, IpListError> {
        if self.entries()?.contains(&ip) {
            debug!("{} already in {}", ip, self.path.display());
            return Ok(false);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(file, "{}", ip).map_err(|e| self.io_error(e))?;
        debug!("Recorded {} in {}", ip, self.path.display());
        Ok(true)
    }

    /// Insert several addresses, returning the ones that were new
    pub fn extend<I>(&self, ips: I) -> Result<Vec<IpAddr>, IpListError>
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let mut added = Vec::new();
        for ip in ips {
            if self.insert(ip)? {
                added.push(ip);
            }
        }
        Ok(added)
    }

    /// Delete the file. Returns false if there was nothing to delete.
    pub fn remove(&self) -> Result<bool, IpListError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: io::Error) -> IpListError {
        IpListError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn parse_entries(content: &str) -> Vec<IpAddr> {
    let mut entries = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match line.parse::<IpAddr>() {
            Ok(ip) if !entries.contains(&ip) => entries.push(ip),
            Ok(_) => {}
            Err(_) => warn!("Ignoring malformed IP list entry: {:?}", line),
        }
    }
    entries
}
