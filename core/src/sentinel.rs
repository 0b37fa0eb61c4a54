//! Lifecycle guard files.
//!
//! Three transient files live beside the ledger:
//!
//! - **lock**: its existence means a checkpoint operation is in progress.
//!   The YAML inside is diagnostic only.
//! - **draft**: the editable in-progress record.
//! - **diff**: read-only diff context for the draft.
//!
//! Nothing here ever parses lock contents to decide what to do; recovery
//! is driven purely by which files exist.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SentinelNames;

/// Errors from guard file operations.
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    /// The lock file already exists.
    #[error("lock file already exists at {path}")]
    AlreadyLocked {
        path: PathBuf,
        holder: Option<LockMetadata>,
    },

    /// Filesystem I/O error.
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Diagnostic contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
    /// Process ID of the lock holder
    pub pid: u32,

    /// Hostname where the lock was taken
    pub host: String,

    /// When the operation started
    pub started_at: DateTime<Utc>,

    /// Version of the tool holding the lock
    pub tool_version: String,
}

impl LockMetadata {
    /// Metadata for the current process.
    pub fn current(tool_version: &str) -> Self {
        Self {
            pid: std::process::id(),
            host: current_host(),
            started_at: Utc::now(),
            tool_version: tool_version.to_string(),
        }
    }

    /// Best-effort hint that the holder is gone.
    ///
    /// Only meaningful on the same host. Never used to remove a lock.
    pub fn is_stale(&self) -> bool {
        if self.host != current_host() {
            return false;
        }
        !is_process_running(self.pid)
    }

    /// One-line description for status output and error messages.
    pub fn display_summary(&self) -> String {
        let age = Utc::now().signed_duration_since(self.started_at);
        let age_str = if age.num_hours() > 0 {
            format!("{}h {}m ago", age.num_hours(), age.num_minutes() % 60)
        } else if age.num_minutes() > 0 {
            format!("{}m {}s ago", age.num_minutes(), age.num_seconds() % 60)
        } else {
            format!("{}s ago", age.num_seconds().max(0))
        };
        format!("PID {} on {} started {age_str}", self.pid, self.host)
    }
}

impl std::fmt::Display for LockMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_summary())
    }
}

fn current_host() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // kill(pid, 0) probes for existence without sending a signal.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    // Can't check on this platform, assume running
    true
}

/// Which guard files currently exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presence {
    pub lock: bool,
    pub draft: bool,
    pub diff: bool,
}

/// Guard files for one project directory.
#[derive(Debug, Clone)]
pub struct Sentinels {
    lock: PathBuf,
    draft: PathBuf,
    diff: PathBuf,
}

impl Sentinels {
    pub fn new(dir: &Path, names: &SentinelNames) -> Self {
        Self {
            lock: dir.join(&names.lock),
            draft: dir.join(&names.draft),
            diff: dir.join(&names.diff),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock
    }

    pub fn draft_path(&self) -> &Path {
        &self.draft
    }

    pub fn diff_path(&self) -> &Path {
        &self.diff
    }

    pub fn presence(&self) -> Presence {
        Presence {
            lock: self.lock.exists(),
            draft: self.draft.exists(),
            diff: self.diff.exists(),
        }
    }

    /// Create the lock file, failing if it already exists.
    pub fn acquire_lock(&self, metadata: &LockMetadata) -> Result<(), SentinelError> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SentinelError::AlreadyLocked {
                    path: self.lock.clone(),
                    holder: self.read_lock(),
                });
            }
            Err(e) => return Err(io_err(&self.lock, e)),
        };

        let yaml = serde_yaml::to_string(metadata)
            .map_err(|e| io_err(&self.lock, io::Error::other(e)))?;
        file.write_all(yaml.as_bytes())
            .map_err(|e| io_err(&self.lock, e))?;
        file.sync_all().map_err(|e| io_err(&self.lock, e))?;

        tracing::debug!(path = %self.lock.display(), pid = metadata.pid, "acquired lock");
        Ok(())
    }

    /// Lock metadata, if the lock exists and is readable.
    pub fn read_lock(&self) -> Option<LockMetadata> {
        let text = fs::read_to_string(&self.lock).ok()?;
        serde_yaml::from_str(&text).ok()
    }

    pub fn write_draft(&self, contents: &str) -> Result<(), SentinelError> {
        fs::write(&self.draft, contents).map_err(|e| io_err(&self.draft, e))
    }

    /// Draft text, or `None` when there is no draft.
    pub fn read_draft(&self) -> Result<Option<String>, SentinelError> {
        match fs::read_to_string(&self.draft) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&self.draft, e)),
        }
    }

    pub fn write_diff(&self, contents: &str) -> Result<(), SentinelError> {
        fs::write(&self.diff, contents).map_err(|e| io_err(&self.diff, e))
    }

    /// Remove the draft. Returns whether it existed.
    pub fn remove_draft(&self) -> Result<bool, SentinelError> {
        remove_if_present(&self.draft)
    }

    /// Remove every guard file. Missing files are not an error.
    ///
    /// Returns the paths that were actually removed.
    pub fn remove_all(&self) -> Result<Vec<PathBuf>, SentinelError> {
        let mut removed = Vec::new();
        for path in [&self.draft, &self.diff, &self.lock] {
            if remove_if_present(path)? {
                removed.push(path.clone());
            }
        }
        Ok(removed)
    }
}

fn remove_if_present(path: &Path) -> Result<bool, SentinelError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed guard file");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(path, e)),
    }
}

fn io_err(path: &Path, source: io::Error) -> SentinelError {
    SentinelError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sentinels(dir: &TempDir) -> Sentinels {
        Sentinels::new(dir.path(), &SentinelNames::default())
    }

    #[test]
    fn lock_is_exclusive_and_reports_holder() {
        let dir = TempDir::new().expect("temp dir");
        let s = sentinels(&dir);
        let meta = LockMetadata::current("test");

        s.acquire_lock(&meta).expect("first acquire");
        let err = s.acquire_lock(&meta).unwrap_err();
        match err {
            SentinelError::AlreadyLocked { holder, .. } => assert_eq!(holder, Some(meta)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn garbage_lock_still_counts_as_locked() {
        let dir = TempDir::new().expect("temp dir");
        let s = sentinels(&dir);
        fs::write(s.lock_path(), "not: [yaml").expect("write");

        assert!(s.presence().lock);
        assert!(s.read_lock().is_none());
        assert!(matches!(
            s.acquire_lock(&LockMetadata::current("test")),
            Err(SentinelError::AlreadyLocked { holder: None, .. })
        ));
    }

    #[test]
    fn remove_all_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let s = sentinels(&dir);
        s.acquire_lock(&LockMetadata::current("test")).expect("lock");
        s.write_draft("changes: []\n").expect("draft");

        let removed = s.remove_all().expect("remove");
        assert_eq!(removed.len(), 2);
        assert_eq!(s.presence(), Presence::default());
        assert!(s.remove_all().expect("remove again").is_empty());
    }

    #[test]
    fn current_process_lock_is_not_stale() {
        assert!(!LockMetadata::current("test").is_stale());
    }

    #[test]
    fn lock_from_other_host_is_never_stale() {
        let mut meta = LockMetadata::current("test");
        meta.host = "some-other-host.invalid".into();
        meta.pid = u32::MAX;
        assert!(!meta.is_stale());
    }
}
