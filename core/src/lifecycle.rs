//! Checkpoint lifecycle controller.
//!
//! ```text
//! Idle ──check──▶ Preparing ──▶ AwaitingInput ──commit──▶ Finalizing ──▶ Idle
//!                     │               │                       │
//!                     └──rollback─▶ Idle     clean ──▶ Aborting ◀──┘ ──▶ Idle
//! ```
//!
//! The persistent part of the state is nothing more than which guard files
//! exist (see [`crate::sentinel`]). `Preparing`, `Finalizing` and
//! `Aborting` only exist while an operation is running in this process.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use logbook_git_tooling::Vcs;
use logbook_ledger::{
    CheckpointRecord, FieldError, InitOutcome, LedgerStore, LintWarning, NextStep, lint, validate,
};
use serde::Serialize;

use crate::config::LogbookConfig;
use crate::draft::{self, Draft};
use crate::error::LifecycleError;
use crate::sentinel::{LockMetadata, Presence, Sentinels};

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No guard files present
    Idle,
    /// `check` holds the lock and is writing the draft
    Preparing,
    /// Lock and draft exist; waiting for the draft to be filled in
    AwaitingInput,
    /// `commit` is validating, appending and committing
    Finalizing,
    /// `clean` is removing guard files
    Aborting,
    /// Lock without a draft: crashed `check` or a partial commit
    Stalled,
    /// Draft without a lock
    OrphanDraft,
}

impl LifecycleState {
    /// State implied by the guard files on disk.
    pub fn observe(presence: Presence) -> Self {
        match (presence.lock, presence.draft) {
            (false, false) => Self::Idle,
            (true, true) => Self::AwaitingInput,
            (true, false) => Self::Stalled,
            (false, true) => Self::OrphanDraft,
        }
    }

    /// Whether a checkpoint operation is in flight.
    pub fn in_progress(self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, Preparing)
                | (Preparing, AwaitingInput)
                | (Preparing, Idle)
                | (AwaitingInput | OrphanDraft, Finalizing)
                | (Finalizing, Idle)
                | (Finalizing, AwaitingInput)
                | (Finalizing, OrphanDraft)
                | (Finalizing, Stalled)
                | (_, Aborting)
                | (Aborting, Idle)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::AwaitingInput => "awaiting_input",
            Self::Finalizing => "finalizing",
            Self::Aborting => "aborting",
            Self::Stalled => "stalled",
            Self::OrphanDraft => "orphan_draft",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-process state tracker for a single operation.
#[derive(Debug)]
struct StateMachine {
    state: LifecycleState,
}

impl StateMachine {
    fn new(state: LifecycleState) -> Self {
        Self { state }
    }

    fn advance(&mut self, next: LifecycleState) -> Result<(), LifecycleError> {
        if !self.state.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::info!(from = %self.state, to = %next, "lifecycle transition");
        self.state = next;
        Ok(())
    }
}

/// Options for [`Lifecycle::commit`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOptions {
    /// Validate and report without touching anything
    pub dry_run: bool,
    /// Stage only the ledger file
    pub changelog_only: bool,
}

/// Result of [`Lifecycle::check`].
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub draft_path: PathBuf,
    pub diff_path: PathBuf,
    pub carried_next_steps: usize,
    pub files_changed: usize,
}

/// Result of [`Lifecycle::commit`].
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    DryRun {
        message: String,
        staged: Vec<String>,
        warnings: Vec<LintWarning>,
        record: CheckpointRecord,
    },
    Committed {
        commit_id: String,
        message: String,
        warnings: Vec<LintWarning>,
        record: CheckpointRecord,
    },
}

/// Result of [`Lifecycle::clean`].
#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub previous: LifecycleState,
    pub removed: Vec<PathBuf>,
}

/// Result of [`Lifecycle::lint_draft`].
#[derive(Debug, Clone, Default)]
pub struct DraftReport {
    pub errors: Vec<FieldError>,
    pub warnings: Vec<LintWarning>,
}

impl DraftReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Read-only snapshot returned by [`Lifecycle::start`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub project_dir: PathBuf,
    pub state: LifecycleState,
    pub lock: Option<LockMetadata>,
    pub lock_stale: bool,
    pub draft_present: bool,
    pub diff_present: bool,
    pub ledger: Option<LedgerSummary>,
}

/// Ledger facts shown by `start`.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    pub path: PathBuf,
    pub project_id: Option<String>,
    pub record_count: usize,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub last_commit_id: Option<String>,
    pub next_steps: Vec<NextStep>,
}

/// Drives check/commit/clean for one project directory.
pub struct Lifecycle<V: Vcs> {
    project_dir: PathBuf,
    config: LogbookConfig,
    vcs: V,
    sentinels: Sentinels,
    ledger: LedgerStore,
    tool_version: String,
}

impl<V: Vcs> Lifecycle<V> {
    pub fn new(project_dir: impl Into<PathBuf>, config: LogbookConfig, vcs: V) -> Self {
        let project_dir = project_dir.into();
        let sentinels = Sentinels::new(&project_dir, &config.sentinels);
        let ledger = LedgerStore::new(project_dir.join(&config.ledger_file));
        Self {
            project_dir,
            config,
            vcs,
            sentinels,
            ledger,
            tool_version: crate::VERSION.to_string(),
        }
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = version.into();
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn config(&self) -> &LogbookConfig {
        &self.config
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn sentinels(&self) -> &Sentinels {
        &self.sentinels
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::observe(self.sentinels.presence())
    }

    /// Create the ledger, or add a header to a legacy one.
    pub fn init(&self) -> Result<InitOutcome, LifecycleError> {
        Ok(self.ledger.initialize(&self.tool_version)?)
    }

    /// Read-only status report.
    pub fn start(&self) -> Result<StatusReport, LifecycleError> {
        let presence = self.sentinels.presence();
        let lock = if presence.lock {
            self.sentinels.read_lock()
        } else {
            None
        };
        let lock_stale = lock.as_ref().is_some_and(LockMetadata::is_stale);

        let ledger = if self.ledger.exists() {
            let contents = self.ledger.read_ledger()?;
            let last = contents.last_record();
            Some(LedgerSummary {
                path: self.ledger.path().to_path_buf(),
                project_id: contents.header.as_ref().map(|h| h.project_id.clone()),
                record_count: contents.records.len(),
                last_timestamp: last.and_then(|r| r.timestamp),
                last_commit_id: last
                    .filter(|r| r.is_committed())
                    .map(|r| r.commit_id.clone()),
                next_steps: last.map(|r| r.next_steps.clone()).unwrap_or_default(),
            })
        } else {
            None
        };

        Ok(StatusReport {
            project_dir: self.project_dir.clone(),
            state: LifecycleState::observe(presence),
            lock,
            lock_stale,
            draft_present: presence.draft,
            diff_present: presence.diff,
            ledger,
        })
    }

    /// Take the lock and write the diff context and draft skeleton.
    pub fn check(&self) -> Result<CheckOutcome, LifecycleError> {
        if !self.vcs.is_repository(&self.project_dir) {
            return Err(LifecycleError::NotARepository {
                path: self.project_dir.clone(),
            });
        }

        let observed = self.state();
        if observed.in_progress() {
            return Err(self.conflict(observed));
        }

        let mut machine = StateMachine::new(observed);
        machine.advance(LifecycleState::Preparing)?;

        let metadata = LockMetadata::current(&self.tool_version);
        self.sentinels
            .acquire_lock(&metadata)
            .map_err(|e| match LifecycleError::from(e) {
                LifecycleError::Conflict { .. } => self.conflict(self.state()),
                other => other,
            })?;

        match self.prepare() {
            Ok(outcome) => {
                machine.advance(LifecycleState::AwaitingInput)?;
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(error = %err, "check failed, removing guard files");
                if let Err(cleanup) = self.sentinels.remove_all() {
                    tracing::warn!(error = %cleanup, "failed to remove guard files after check error");
                }
                machine.advance(LifecycleState::Idle)?;
                Err(err)
            }
        }
    }

    fn prepare(&self) -> Result<CheckOutcome, LifecycleError> {
        let status = self.vcs.status(&self.project_dir)?;
        let diff = self.vcs.combined_diff(&self.project_dir)?;

        let next_steps = if self.ledger.exists() {
            self.ledger
                .read_records()?
                .pop()
                .map(|r| r.next_steps)
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        let files_changed = draft::diffstat(&diff);

        self.sentinels.write_diff(&diff)?;

        let outcome = CheckOutcome {
            draft_path: self.sentinels.draft_path().to_path_buf(),
            diff_path: self.sentinels.diff_path().to_path_buf(),
            carried_next_steps: next_steps.len(),
            files_changed: files_changed.len(),
        };

        let skeleton = Draft::skeleton(
            &status,
            Some(self.config.sentinels.diff.clone()),
            next_steps,
            files_changed,
        );
        let text = skeleton.render().map_err(|e| LifecycleError::Io {
            path: self.sentinels.draft_path().to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        self.sentinels.write_draft(&text)?;

        tracing::info!(
            draft = %outcome.draft_path.display(),
            carried_next_steps = outcome.carried_next_steps,
            files_changed = outcome.files_changed,
            "draft ready"
        );
        Ok(outcome)
    }

    /// Validate the draft, append it, commit and backfill the commit id.
    pub fn commit(&self, options: CommitOptions) -> Result<CommitOutcome, LifecycleError> {
        let observed = self.state();
        let draft_path = self.sentinels.draft_path().to_path_buf();
        let Some(text) = self.sentinels.read_draft()? else {
            return Err(LifecycleError::NoDraft { draft_path });
        };

        let mut machine = StateMachine::new(observed);
        machine.advance(LifecycleState::Finalizing)?;

        let mut record = match self.validated_record(&text) {
            Ok(record) => record,
            Err(errors) => {
                machine.advance(observed)?;
                return Err(LifecycleError::ValidationFailed { draft_path, errors });
            }
        };
        let warnings = if self.config.lint.enabled {
            lint(&record)
        } else {
            Vec::new()
        };

        if record.is_committed() {
            tracing::warn!(commit_id = %record.commit_id, "ignoring commit_id set in draft");
            record.commit_id.clear();
        }
        if record.timestamp.is_none() {
            record.timestamp = Some(Utc::now());
        }

        let message = draft::commit_message(&record, self.config.commit.subject_prefix.as_deref());

        if options.dry_run {
            let staged = self.staged_preview(options.changelog_only)?;
            machine.advance(observed)?;
            return Ok(CommitOutcome::DryRun {
                message,
                staged,
                warnings,
                record,
            });
        }

        self.ledger.initialize(&self.tool_version)?;
        self.ledger.append(&record)?;

        match self.finish_commit(&message, options) {
            Ok(commit_id) => {
                machine.advance(LifecycleState::Idle)?;
                record.commit_id = commit_id.clone();
                Ok(CommitOutcome::Committed {
                    commit_id,
                    message,
                    warnings,
                    record,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "commit incomplete after append");
                machine.advance(LifecycleState::Stalled)?;
                Err(err)
            }
        }
    }

    fn validated_record(&self, text: &str) -> Result<CheckpointRecord, Vec<FieldError>> {
        let record = draft::parse(text).map_err(|e| {
            vec![FieldError {
                field: "draft".into(),
                message: e.to_string(),
            }]
        })?;
        validate(&record).map_err(|e| e.errors)?;
        Ok(record)
    }

    /// Everything after the append. Any failure here is a partial commit.
    fn finish_commit(&self, message: &str, options: CommitOptions) -> Result<String, LifecycleError> {
        let partial = |commit_id: Option<String>,
                       source: Box<dyn std::error::Error + Send + Sync>| {
            LifecycleError::PartialCommit {
                ledger_path: self.ledger.path().to_path_buf(),
                commit_id,
                source,
            }
        };

        // Drop the draft first so a retry cannot append the same record twice.
        self.sentinels
            .remove_draft()
            .map_err(|e| partial(None, Box::new(e)))?;

        let staged = if options.changelog_only {
            self.vcs
                .stage_file(&self.project_dir, Path::new(&self.config.ledger_file))
        } else {
            self.vcs.stage_all(&self.project_dir)
        };
        staged.map_err(|e| partial(None, Box::new(e)))?;

        let commit_id = self
            .vcs
            .commit(&self.project_dir, message)
            .map_err(|e| partial(None, Box::new(e)))?;

        self.ledger
            .backfill_commit_id(&commit_id)
            .map_err(|e| partial(Some(commit_id.clone()), Box::new(e)))?;

        self.sentinels.remove_all()?;
        tracing::info!(%commit_id, "checkpoint committed");
        Ok(commit_id)
    }

    fn staged_preview(&self, changelog_only: bool) -> Result<Vec<String>, LifecycleError> {
        let ledger_file = self.config.ledger_file.clone();
        if changelog_only {
            return Ok(vec![ledger_file]);
        }
        let status = self.vcs.status(&self.project_dir)?;
        let mut staged = draft::status_paths(&status, &self.config.sentinels.all());
        if !staged.contains(&ledger_file) {
            staged.push(ledger_file);
            staged.sort();
        }
        Ok(staged)
    }

    /// Remove every guard file. Never touches the ledger.
    pub fn clean(&self) -> Result<CleanOutcome, LifecycleError> {
        let previous = self.state();
        let mut machine = StateMachine::new(previous);
        machine.advance(LifecycleState::Aborting)?;
        let removed = self.sentinels.remove_all()?;
        machine.advance(LifecycleState::Idle)?;
        Ok(CleanOutcome { previous, removed })
    }

    /// Validation errors and lint warnings for the current draft.
    pub fn lint_draft(&self) -> Result<DraftReport, LifecycleError> {
        let draft_path = self.sentinels.draft_path().to_path_buf();
        let Some(text) = self.sentinels.read_draft()? else {
            return Err(LifecycleError::NoDraft { draft_path });
        };
        let record = match draft::parse(&text) {
            Ok(record) => record,
            Err(e) => {
                return Ok(DraftReport {
                    errors: vec![FieldError {
                        field: "draft".into(),
                        message: e.to_string(),
                    }],
                    warnings: Vec::new(),
                });
            }
        };
        Ok(DraftReport {
            errors: validate(&record).err().map(|e| e.errors).unwrap_or_default(),
            warnings: lint(&record),
        })
    }

    /// One line per guard file and the ledger, for error output.
    pub fn artifact_summary(&self) -> Vec<String> {
        let presence = self.sentinels.presence();
        let mark = |present: bool| if present { "present" } else { "absent" };
        let mut lines = vec![
            format!("state: {}", LifecycleState::observe(presence)),
            format!(
                "lock:  {} ({})",
                self.sentinels.lock_path().display(),
                mark(presence.lock)
            ),
            format!(
                "draft: {} ({})",
                self.sentinels.draft_path().display(),
                mark(presence.draft)
            ),
            format!(
                "diff:  {} ({})",
                self.sentinels.diff_path().display(),
                mark(presence.diff)
            ),
            format!(
                "ledger: {} ({})",
                self.ledger.path().display(),
                mark(self.ledger.exists())
            ),
        ];
        if let Some(holder) = presence.lock.then(|| self.sentinels.read_lock()).flatten() {
            lines.push(format!("lock holder: {}", holder.display_summary()));
        }
        lines
    }

    fn conflict(&self, state: LifecycleState) -> LifecycleError {
        LifecycleError::Conflict {
            state,
            lock_path: self.sentinels.lock_path().to_path_buf(),
            draft_path: self.sentinels.draft_path().to_path_buf(),
            holder: self.sentinels.read_lock(),
        }
    }
}
