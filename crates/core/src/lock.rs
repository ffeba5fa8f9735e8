// Advisory lock shared by every process that drives the VPN stack.
// The tray and the CLI each own an orchestrator; this file keeps their
// sequences from interleaving on the marker and the credentials store.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct OperationLock {
    path: PathBuf,
}

/// Held for the duration of one sequence; the lock goes with the file handle
#[derive(Debug)]
pub struct OperationLockGuard {
    _file: File,
}

impl OperationLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Lock file kept next to the carry-over marker
    pub fn beside(marker: &Path) -> Self {
        Self::new(marker.with_file_name("operation.lock"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock without waiting and record `holder` in it.
    /// `Ok(None)` means another handle holds it.
    pub fn try_acquire(&self, holder: &str) -> Result<Option<OperationLockGuard>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        if !lock_exclusive(&file)? {
            debug!("{} is held elsewhere", self.path.display());
            return Ok(None);
        }

        file.set_len(0)?;
        file.write_all(holder.as_bytes())?;
        Ok(Some(OperationLockGuard { _file: file }))
    }

    /// What the current holder recorded, if anything
    pub fn holder(&self) -> Option<String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .map(|contents| contents.trim().to_string())
            .filter(|holder| !holder.is_empty())
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor belongs to `file`, which outlives the call
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }

    let err = std::io::Error::last_os_error();
    if err.kind() == ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err.into())
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_handle_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let first = OperationLock::beside(&dir.path().join("state").join("killswitch.restore"));
        let second = OperationLock::new(first.path());

        let guard = first.try_acquire("switch region to ca_toronto").unwrap();
        assert!(guard.is_some());
        assert!(second.try_acquire("reconnect").unwrap().is_none());
        assert_eq!(
            second.holder().as_deref(),
            Some("switch region to ca_toronto")
        );

        drop(guard);
        assert!(second.try_acquire("reconnect").unwrap().is_some());
        assert_eq!(second.holder().as_deref(), Some("reconnect"));
    }

    #[test]
    fn test_lock_file_sits_beside_marker() {
        let lock = OperationLock::beside(Path::new("/var/cache/pia-status/killswitch.restore"));
        assert_eq!(lock.path(), Path::new("/var/cache/pia-status/operation.lock"));
    }
}
