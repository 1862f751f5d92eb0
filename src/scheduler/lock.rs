// src/scheduler/lock.rs
//! Single-instance guard: a lock file holding the owner's pid.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("scheduler already running (pid {pid:?}, lock {path})")]
    Held { pid: Option<u32>, path: PathBuf },
    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct InstanceLock {
    path: PathBuf,
    /// Remove a lock whose owner is gone instead of refusing to start.
    reclaim_stale: bool,
}

impl InstanceLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reclaim_stale: false,
        }
    }

    pub fn reclaim_stale(mut self, yes: bool) -> Self {
        self.reclaim_stale = yes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pid recorded in the lock file, if it exists and parses.
    pub fn holder(&self) -> Option<u32> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Without `reclaim_stale`, any existing file counts as held, live owner or not.
    pub fn acquire(&self) -> Result<LockGuard, LockError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| self.io(source))?;
        }
        match self.create() {
            Err(LockError::Held { pid, .. })
                if self.reclaim_stale && !pid.is_some_and(pid_alive) =>
            {
                warn!(
                    target: "scheduler",
                    pid = ?pid,
                    path = %self.path.display(),
                    "reclaiming stale lock"
                );
                match fs::remove_file(&self.path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(self.io(e)),
                }
                self.create()
            }
            other => other,
        }
    }

    fn create(&self) -> Result<LockGuard, LockError> {
        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(LockError::Held {
                    pid: self.holder(),
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(self.io(e)),
        };
        self.stamp(file)
    }

    /// Record our pid in the lock file just created. If that fails the file
    /// is removed, so an empty lock never blocks later starts.
    fn stamp(&self, mut out: impl Write) -> Result<LockGuard, LockError> {
        let pid = std::process::id();
        let written = out
            .write_all(pid.to_string().as_bytes())
            .and_then(|()| out.flush());
        if let Err(e) = written {
            drop(out);
            if let Err(rm) = fs::remove_file(&self.path) {
                warn!(
                    target: "scheduler",
                    path = %self.path.display(),
                    error = %rm,
                    "could not remove unwritten lock"
                );
            }
            return Err(self.io(e));
        }
        info!(target: "scheduler", pid, path = %self.path.display(), "lock acquired");
        Ok(LockGuard {
            path: self.path.clone(),
            released: false,
        })
    }

    fn io(&self, source: io::Error) -> LockError {
        LockError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Removes the lock file when dropped.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => info!(target: "scheduler", path = %self.path.display(), "lock released"),
            Err(e) => warn!(
                target: "scheduler",
                path = %self.path.display(),
                error = %e,
                "could not remove lock"
            ),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// No cheap liveness check on this platform; treat the owner as alive.
#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = InstanceLock::new(dir.path().join("scheduler.lock"));

        let guard = lock.acquire().unwrap();
        assert_eq!(lock.holder(), Some(std::process::id()));
        assert!(matches!(lock.acquire(), Err(LockError::Held { .. })));

        guard.release();
        assert!(!lock.path().exists());
        let _again = lock.acquire().unwrap();
    }

    struct DiskFull;

    impl Write for DiskFull {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("no space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unwritten_pid_does_not_leave_a_lock_behind() {
        let dir = tempfile::tempdir().unwrap();
        let lock = InstanceLock::new(dir.path().join("scheduler.lock"));
        fs::write(lock.path(), "").unwrap();

        assert!(matches!(lock.stamp(DiskFull), Err(LockError::Io { .. })));
        assert!(!lock.path().exists());

        let _guard = lock.acquire().unwrap();
        assert_eq!(lock.holder(), Some(std::process::id()));
    }

    #[test]
    fn drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/scheduler.lock");
        {
            let _g = InstanceLock::new(&path).acquire().unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn stale_lock_is_reclaimed_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.lock");
        // pid beyond the kernel's pid_max
        fs::write(&path, "4194305").unwrap();

        let strict = InstanceLock::new(&path);
        assert!(matches!(
            strict.acquire(),
            Err(LockError::Held { pid: Some(4194305), .. })
        ));

        let lenient = InstanceLock::new(&path).reclaim_stale(true);
        let guard = lenient.acquire().unwrap();
        assert_eq!(lenient.holder(), Some(std::process::id()));
        drop(guard);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn live_lock_is_never_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.lock");
        fs::write(&path, std::process::id().to_string()).unwrap();
        let lenient = InstanceLock::new(&path).reclaim_stale(true);
        assert!(matches!(lenient.acquire(), Err(LockError::Held { .. })));
        assert!(path.exists());
    }
}
