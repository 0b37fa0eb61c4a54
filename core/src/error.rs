//! Lifecycle error taxonomy.
//!
//! Every fail-closed condition maps to one [`ErrorCategory`], which in turn
//! decides the process exit code and the recovery hint shown to the user.

use std::path::PathBuf;

use logbook_git_tooling::VcsError;
use logbook_ledger::{FieldError, LedgerError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::lifecycle::LifecycleState;
use crate::sentinel::{LockMetadata, SentinelError};

/// Coarse grouping used for exit codes and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The draft did not pass validation
    Validation,
    /// Another operation is in progress, or the requested step does not
    /// fit the current lifecycle state
    State,
    /// The record was appended but the commit did not complete
    PartialCommit,
    /// The ledger changed under us
    ConcurrentModification,
    /// Filesystem, VCS or configuration trouble
    Infrastructure,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::State => "STATE",
            Self::PartialCommit => "PARTIAL_COMMIT",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::Infrastructure => "INFRASTRUCTURE",
        }
    }

    /// Process exit code for this category
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation => 1,
            Self::State => 2,
            Self::PartialCommit => 3,
            Self::ConcurrentModification => 4,
            Self::Infrastructure => 5,
        }
    }
}

/// Errors from lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{path} is not inside a git work tree")]
    NotARepository { path: PathBuf },

    #[error("a checkpoint operation is already in progress ({state})")]
    Conflict {
        state: LifecycleState,
        lock_path: PathBuf,
        draft_path: PathBuf,
        holder: Option<LockMetadata>,
    },

    #[error("no draft found at {draft_path}")]
    NoDraft { draft_path: PathBuf },

    #[error("draft {draft_path} failed validation:\n{}", render_field_errors(.errors))]
    ValidationFailed {
        draft_path: PathBuf,
        errors: Vec<FieldError>,
    },

    #[error(transparent)]
    ConcurrentModification(LedgerError),

    #[error("checkpoint appended to {ledger_path} but the commit did not complete: {source}")]
    PartialCommit {
        ledger_path: PathBuf,
        /// Set when the commit exists but the backfill failed.
        commit_id: Option<String>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error(transparent)]
    Ledger(LedgerError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn render_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<LedgerError> for LifecycleError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ConcurrentModification { .. } => Self::ConcurrentModification(err),
            other => Self::Ledger(other),
        }
    }
}

impl From<SentinelError> for LifecycleError {
    fn from(err: SentinelError) -> Self {
        match err {
            SentinelError::Io { path, source } => Self::Io { path, source },
            SentinelError::AlreadyLocked { path, holder } => Self::Conflict {
                state: LifecycleState::Stalled,
                draft_path: PathBuf::new(),
                lock_path: path,
                holder,
            },
        }
    }
}

impl LifecycleError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationFailed { .. } => ErrorCategory::Validation,
            Self::NotARepository { .. }
            | Self::Conflict { .. }
            | Self::NoDraft { .. }
            | Self::InvalidTransition { .. } => ErrorCategory::State,
            Self::PartialCommit { .. } => ErrorCategory::PartialCommit,
            Self::ConcurrentModification(_) => ErrorCategory::ConcurrentModification,
            Self::Ledger(_) | Self::Vcs(_) | Self::Io { .. } | Self::Config(_) => {
                ErrorCategory::Infrastructure
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }

    /// The exact next command for the user to retry or abandon.
    pub fn recovery_hint(&self) -> String {
        match self {
            Self::NotARepository { .. } => {
                "run `git init` (or change into a repository) and retry".to_string()
            }
            Self::Conflict { holder, .. } => {
                let base = "finish it with `logbook commit`, or abandon it with `logbook clean`";
                match holder {
                    Some(h) if h.is_stale() => {
                        format!("{base} (lock holder PID {} is no longer running)", h.pid)
                    }
                    _ => base.to_string(),
                }
            }
            Self::NoDraft { .. } => {
                "run `logbook check` to prepare a draft; if a lock is left over, run `logbook clean` first"
                    .to_string()
            }
            Self::ValidationFailed { draft_path, .. } => format!(
                "edit {} and run `logbook commit` again (nothing was written)",
                draft_path.display()
            ),
            Self::ConcurrentModification(_) => {
                "another writer touched the ledger; inspect it with `logbook log`, then re-run `logbook commit`"
                    .to_string()
            }
            Self::PartialCommit {
                commit_id: Some(id),
                ledger_path,
                ..
            } => format!(
                "commit {id} exists but {} still has an empty commit_id; set it by hand, then run `logbook clean`",
                ledger_path.display()
            ),
            Self::PartialCommit { ledger_path, .. } => format!(
                "the record is in {}; fix the problem, commit with `git commit`, then run `logbook clean` (do not re-run `logbook commit`)",
                ledger_path.display()
            ),
            Self::InvalidTransition { .. } => "run `logbook start` to inspect the current state".to_string(),
            Self::Ledger(_) => {
                "fix the ledger file named above, then re-run `logbook check` or `logbook commit`; `logbook clean` abandons the checkpoint"
                    .to_string()
            }
            Self::Vcs(_) => {
                "fix the git problem above, then re-run `logbook check` or `logbook commit`; `logbook clean` abandons the checkpoint"
                    .to_string()
            }
            Self::Io { path, .. } => format!(
                "fix access to {}, then re-run `logbook check` or `logbook commit`; `logbook clean` abandons the checkpoint",
                path.display()
            ),
            Self::Config(_) => {
                "fix the config file named above, or pass another with `--config`, then retry".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn exit_codes_follow_category() {
        let validation = LifecycleError::ValidationFailed {
            draft_path: PathBuf::from("d"),
            errors: vec![FieldError {
                field: "changes".into(),
                message: "must contain at least one entry".into(),
            }],
        };
        assert_eq!(validation.exit_code(), 1);

        let conflict = LifecycleError::NoDraft {
            draft_path: PathBuf::from("d"),
        };
        assert_eq!(conflict.exit_code(), 2);

        let concurrent: LifecycleError = LedgerError::ConcurrentModification {
            path: PathBuf::from("l"),
            detail: "size changed".into(),
        }
        .into();
        assert_eq!(concurrent.exit_code(), 4);

        let other: LifecycleError = LedgerError::NoRecords {
            path: PathBuf::from("l"),
        }
        .into();
        assert_eq!(other.exit_code(), 5);
    }

    #[test]
    fn validation_message_lists_every_field() {
        let err = LifecycleError::ValidationFailed {
            draft_path: PathBuf::from(".logbook.draft.yaml"),
            errors: vec![
                FieldError {
                    field: "changes[0].summary".into(),
                    message: "contains an unresolved placeholder".into(),
                },
                FieldError {
                    field: "changes[0].change_type".into(),
                    message: "'feat' is not one of feature, fix, refactor, docs, perf, other"
                        .into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("changes[0].summary"));
        assert!(text.contains("changes[0].change_type"));
    }

    #[test]
    fn partial_commit_hint_names_the_commit() {
        let err = LifecycleError::PartialCommit {
            ledger_path: PathBuf::from("LOGBOOK.yaml"),
            commit_id: Some("abc123".into()),
            source: "disk full".into(),
        };
        let hint = err.recovery_hint();
        assert!(hint.contains("abc123"));
        assert!(hint.contains("logbook clean"));
    }

    #[test]
    fn infrastructure_errors_name_a_next_command() {
        let errors: Vec<LifecycleError> = vec![
            LedgerError::NoRecords {
                path: PathBuf::from("LOGBOOK.yaml"),
            }
            .into(),
            LifecycleError::Io {
                path: PathBuf::from(".logbook.draft.yaml"),
                source: std::io::Error::other("permission denied"),
            },
            VcsError::NotFound("cannot find binary path".into()).into(),
        ];
        for err in errors {
            assert_eq!(err.exit_code(), 5);
            let hint = err.recovery_hint();
            assert!(hint.contains("logbook commit"), "{hint}");
            assert!(hint.contains("logbook clean"), "{hint}");
        }

        let io = LifecycleError::Io {
            path: PathBuf::from(".logbook.draft.yaml"),
            source: std::io::Error::other("permission denied"),
        };
        assert!(io.recovery_hint().contains(".logbook.draft.yaml"));
    }
}
