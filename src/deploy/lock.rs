// ABOUTME: Per-(app, trigger) locks serializing check-then-act on deployment records.
// ABOUTME: In-process mutexes, plus create-if-not-exists lock files when processes share a state file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::DeployError;
use super::record::ROLLBACK_TRIGGER;
use crate::config::{AppConfig, StrategyKind};
use crate::types::AppKey;

/// How long to wait for a lock file held by another process.
pub const LOCK_WAIT: Duration = Duration::from_secs(30);

const RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Identity of the process executing deployments or holding a lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl LockInfo {
    /// Lock info for the current process.
    pub fn current() -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }

    /// `hostname:pid`, recorded on the deployments this process runs.
    pub fn worker_id(&self) -> String {
        format!("{}:{}", self.holder, self.pid)
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    /// Whether the holder is a process on this host that no longer exists.
    pub fn holder_gone(&self) -> bool {
        let host = gethostname::gethostname().to_string_lossy().into_owned();
        self.holder == host && !process_alive(self.pid)
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH))
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// A lock file created atomically; removed on drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Try once to take the lock at `path`.
    ///
    /// Returns the current holder when the lock is held. Locks that are
    /// stale, unreadable, or held by a dead local process are broken.
    pub fn try_acquire(path: &Path) -> io::Result<Result<Self, LockInfo>> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        match Self::create(path) {
            Ok(lock) => return Ok(Ok(lock)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            // Released between our attempt and the read.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::retry_create(path),
            Err(e) => return Err(e),
        };
        match serde_json::from_str::<LockInfo>(&content) {
            Ok(info) if !info.is_stale() && !info.holder_gone() => Ok(Err(info)),
            Ok(info) => {
                tracing::warn!(
                    lock = %path.display(),
                    holder = %info.holder,
                    pid = info.pid,
                    since = %info.started_at,
                    "breaking abandoned lock"
                );
                Self::break_lock(path, &content)?;
                Self::retry_create(path)
            }
            Err(e) => {
                tracing::warn!(lock = %path.display(), error = %e, "lock info unreadable, breaking lock");
                Self::break_lock(path, &content)?;
                Self::retry_create(path)
            }
        }
    }

    /// Wait up to `wait` for the lock, blocking the current thread.
    pub fn acquire_blocking(path: &Path, wait: Duration) -> io::Result<Result<Self, LockInfo>> {
        let deadline = Instant::now() + wait;
        loop {
            match Self::try_acquire(path)? {
                Ok(lock) => return Ok(Ok(lock)),
                Err(holder) if Instant::now() >= deadline => return Ok(Err(holder)),
                Err(_) => std::thread::sleep(RETRY_INTERVAL),
            }
        }
    }

    /// Wait up to `wait` for the lock without blocking the runtime.
    pub async fn acquire(path: &Path, wait: Duration) -> io::Result<Result<Self, LockInfo>> {
        let deadline = Instant::now() + wait;
        loop {
            match Self::try_acquire(path)? {
                Ok(lock) => return Ok(Ok(lock)),
                Err(holder) if Instant::now() >= deadline => return Ok(Err(holder)),
                Err(_) => tokio::time::sleep(RETRY_INTERVAL).await,
            }
        }
    }

    /// Write the holder info to a private file, then link it into place.
    /// The link fails if the lock exists, so readers never see a half-written lock.
    fn create(path: &Path) -> io::Result<Self> {
        let staged = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        let written = write_info(&staged).and_then(|()| fs::hard_link(&staged, path));
        if let Err(e) = fs::remove_file(&staged)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(file = %staged.display(), error = %e, "failed to remove staged lock");
        }
        written.map(|()| Self {
            path: path.to_path_buf(),
        })
    }

    fn retry_create(path: &Path) -> io::Result<Result<Self, LockInfo>> {
        match Self::create(path) {
            Ok(lock) => Ok(Ok(lock)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(lock = %path.display(), "lock re-taken by another holder");
                Ok(Err(Self::read_info(path).unwrap_or_else(LockInfo::current)))
            }
            Err(e) => Err(e),
        }
    }

    fn read_info(path: &Path) -> Option<LockInfo> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Move the lock aside and delete it, unless someone re-took it first.
    fn break_lock(path: &Path, expected: &str) -> io::Result<()> {
        let aside = path.with_extension(format!("broken.{}", uuid::Uuid::new_v4().simple()));
        match fs::rename(path, &aside) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        }
        if fs::read_to_string(&aside).is_ok_and(|moved| moved != expected) {
            // A fresh lock replaced the abandoned one before the rename.
            if let Err(e) = fs::hard_link(&aside, path) {
                tracing::warn!(lock = %path.display(), error = %e, "could not restore lock moved aside");
            }
        }
        fs::remove_file(&aside)
    }
}

fn write_info(path: &Path) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let json = serde_json::to_string(&LockInfo::current())?;
    file.write_all(json.as_bytes())?;
    file.sync_all()
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}

/// Triggers of `app` whose records must not be active alongside `trigger`.
///
/// An advanced app's releases are shared by all its triggers: a rollback
/// excludes every deploy of the app, and each deploy excludes rollbacks.
pub fn guarded_triggers<'a>(app: &'a AppConfig, trigger: &'a str) -> Vec<&'a str> {
    let mut triggers = vec![trigger];
    if app.strategy == StrategyKind::Advanced {
        if trigger == ROLLBACK_TRIGGER {
            triggers.extend(app.triggers.iter().map(|t| t.name.as_str()));
        } else {
            triggers.push(ROLLBACK_TRIGGER);
        }
    }
    triggers
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct LockKey {
    app: AppKey,
    trigger: String,
}

impl LockKey {
    fn file_name(&self) -> String {
        let clean = |s: &str| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect::<String>()
        };
        format!("{}@{}.lock", clean(self.app.as_str()), clean(&self.trigger))
    }
}

/// Table of async locks, one per (app, trigger) pair seen so far.
///
/// Entries are never evicted; the table is bounded by the configured
/// triggers plus one rollback key per app. With a lock directory, each
/// held pair is also claimed through a lock file so that other processes
/// sharing the state file wait too.
#[derive(Debug, Default)]
pub struct DeployLocks {
    table: parking_lot::Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
    dir: Option<PathBuf>,
}

/// Held locks that release on drop.
#[derive(Debug)]
pub struct DeployLock {
    _files: Vec<LockFile>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl DeployLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks that are also shared with other processes through files in `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            table: parking_lot::Mutex::default(),
            dir: Some(dir.into()),
        }
    }

    /// Wait for the lock of `(app, trigger)`.
    pub async fn acquire(&self, app: &AppKey, trigger: &str) -> Result<DeployLock, DeployError> {
        self.acquire_all(app, &[trigger]).await
    }

    /// Wait for the locks of several triggers of one app, in a fixed order.
    pub async fn acquire_all(
        &self,
        app: &AppKey,
        triggers: &[&str],
    ) -> Result<DeployLock, DeployError> {
        let mut keys: Vec<LockKey> = triggers
            .iter()
            .map(|trigger| LockKey {
                app: app.clone(),
                trigger: trigger.to_string(),
            })
            .collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        let mut files = Vec::new();
        for key in keys {
            let mutex = self.table.lock().entry(key.clone()).or_default().clone();
            guards.push(mutex.lock_owned().await);

            if let Some(ref dir) = self.dir {
                let path = dir.join(key.file_name());
                match LockFile::acquire(&path, LOCK_WAIT).await {
                    Ok(Ok(file)) => files.push(file),
                    Ok(Err(holder)) => {
                        return Err(DeployError::LockHeld {
                            app: key.app.to_string(),
                            trigger: key.trigger,
                            holder: holder.worker_id(),
                            since: holder.started_at,
                        });
                    }
                    Err(e) => {
                        return Err(DeployError::Lock(format!(
                            "failed to lock {}: {e}",
                            path.display()
                        )));
                    }
                }
            }
            tracing::trace!(app = %app, trigger = %key.trigger, "deploy lock acquired");
        }
        Ok(DeployLock {
            _files: files,
            _guards: guards,
        })
    }
}
