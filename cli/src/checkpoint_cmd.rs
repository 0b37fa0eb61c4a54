//! Lifecycle commands: `init`, `check`, `commit`, `clean`, `start`, `lint`.

use logbook_core::{
    CommitOptions, CommitOutcome, Lifecycle, LifecycleError, LifecycleState, LogbookConfig,
    StatusReport,
};
use logbook_git_tooling::{GitCli, Vcs};
use logbook_ledger::{InitOutcome, LintWarning};

use crate::palette::Palette;
use crate::{CommitArgs, PathArgs, StartArgs, project_dir};

fn lifecycle(config: LogbookConfig, args: &PathArgs) -> anyhow::Result<Lifecycle<GitCli>> {
    let dir = project_dir(args.path.as_deref())?;
    let git = GitCli::locate()
        .unwrap_or_else(|err| {
            tracing::debug!(error = %err, "falling back to `git` on PATH");
            GitCli::default()
        })
        .with_excluded(config.sentinels.all());
    Ok(Lifecycle::new(dir, config, git))
}

/// Print the error, what is on disk, and what to run next.
fn report_failure<V: Vcs>(lc: &Lifecycle<V>, err: &LifecycleError) -> i32 {
    let palette = Palette::stderr();
    tracing::debug!(category = err.category().as_str(), "operation failed");

    eprintln!("{} {err}", palette.error("error:"));
    eprintln!();
    for line in lc.artifact_summary() {
        eprintln!("  {}", palette.dim(&line));
    }
    eprintln!();
    eprintln!("{} {}", palette.warn("next:"), err.recovery_hint());
    err.exit_code()
}

fn print_warnings(warnings: &[LintWarning]) {
    if warnings.is_empty() {
        return;
    }
    let palette = Palette::stdout();
    println!("{}", palette.warn(&format!("{} lint warning(s):", warnings.len())));
    for warning in warnings {
        println!("  - {warning}");
    }
}

pub(crate) fn run_init(config: LogbookConfig, args: &PathArgs) -> anyhow::Result<i32> {
    let lc = lifecycle(config, args)?;
    match lc.init() {
        Ok(outcome) => {
            let ledger = lc.ledger().path().display();
            match &outcome {
                InitOutcome::Created(header) => {
                    println!("created {ledger} (project {})", header.project_id);
                }
                InitOutcome::Upgraded { header, records } => {
                    println!(
                        "added identity header to {ledger} (project {}, {records} existing record(s) kept)",
                        header.project_id
                    );
                }
                InitOutcome::AlreadyInitialized(header) => {
                    println!("{ledger} already initialized (project {})", header.project_id);
                }
            }
            Ok(0)
        }
        Err(err) => Ok(report_failure(&lc, &err)),
    }
}

pub(crate) fn run_check(config: LogbookConfig, args: &PathArgs) -> anyhow::Result<i32> {
    let lc = lifecycle(config, args)?;
    match lc.check() {
        Ok(outcome) => {
            let palette = Palette::stdout();
            println!("{} draft written to {}", palette.ok("ready:"), outcome.draft_path.display());
            println!("  diff context: {}", outcome.diff_path.display());
            println!("  files changed: {}", outcome.files_changed);
            if outcome.carried_next_steps > 0 {
                println!(
                    "  carried forward {} next step(s) from the last checkpoint",
                    outcome.carried_next_steps
                );
            }
            println!("fill in the draft, then run `logbook commit` (or `logbook clean` to abandon)");
            Ok(0)
        }
        Err(err) => Ok(report_failure(&lc, &err)),
    }
}

pub(crate) fn run_commit(config: LogbookConfig, args: &CommitArgs) -> anyhow::Result<i32> {
    let lc = lifecycle(config, &args.target)?;
    let options = CommitOptions {
        dry_run: args.dry_run,
        changelog_only: args.changelog_only,
    };
    let palette = Palette::stdout();

    match lc.commit(options) {
        Ok(CommitOutcome::DryRun {
            message,
            staged,
            warnings,
            ..
        }) => {
            println!("{} nothing was written", palette.warn("dry run:"));
            println!();
            println!("commit message:");
            for line in message.lines() {
                println!("  {line}");
            }
            println!();
            println!("would stage:");
            for path in &staged {
                println!("  {path}");
            }
            print_warnings(&warnings);
            Ok(0)
        }
        Ok(CommitOutcome::Committed {
            commit_id,
            message,
            warnings,
            ..
        }) => {
            let subject = message.lines().next().unwrap_or_default();
            println!("{} {commit_id} {subject}", palette.ok("committed"));
            print_warnings(&warnings);
            Ok(0)
        }
        Err(err) => Ok(report_failure(&lc, &err)),
    }
}

pub(crate) fn run_clean(config: LogbookConfig, args: &PathArgs) -> anyhow::Result<i32> {
    let lc = lifecycle(config, args)?;
    match lc.clean() {
        Ok(outcome) => {
            if outcome.removed.is_empty() {
                println!("nothing to clean");
            } else {
                for path in &outcome.removed {
                    println!("removed {}", path.display());
                }
                println!("was {}, now {}", outcome.previous, LifecycleState::Idle);
            }
            Ok(0)
        }
        Err(err) => Ok(report_failure(&lc, &err)),
    }
}

pub(crate) fn run_start(config: LogbookConfig, args: &StartArgs) -> anyhow::Result<i32> {
    let lc = lifecycle(config, &args.target)?;
    let report = match lc.start() {
        Ok(report) => report,
        Err(err) => return Ok(report_failure(&lc, &err)),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in render_status(&report) {
            println!("{line}");
        }
    }
    Ok(0)
}

fn render_status(report: &StatusReport) -> Vec<String> {
    let palette = Palette::stdout();
    let state = match report.state {
        LifecycleState::Idle => palette.ok(report.state.as_str()),
        _ => palette.warn(report.state.as_str()),
    };

    let mut lines = vec![
        format!("project: {}", report.project_dir.display()),
        format!("state:   {state}"),
    ];

    if let Some(lock) = &report.lock {
        let stale = if report.lock_stale {
            " (holder no longer running)"
        } else {
            ""
        };
        lines.push(format!("lock:    {}{stale}", lock.display_summary()));
    }
    if report.draft_present {
        lines.push("draft:   present".to_string());
    }

    match &report.ledger {
        Some(ledger) => {
            lines.push(format!(
                "ledger:  {} ({} checkpoint(s))",
                ledger.path.display(),
                ledger.record_count
            ));
            if let Some(id) = &ledger.project_id {
                lines.push(format!("id:      {id}"));
            }
            if let Some(ts) = ledger.last_timestamp {
                let commit = ledger.last_commit_id.as_deref().unwrap_or("uncommitted");
                lines.push(format!("last:    {} {commit}", ts.to_rfc3339()));
            }
            if !ledger.next_steps.is_empty() {
                lines.push("next steps:".to_string());
                for step in &ledger.next_steps {
                    let priority = step
                        .priority
                        .as_deref()
                        .map(|p| format!("[{p}] "))
                        .unwrap_or_default();
                    lines.push(format!("  - {priority}{}", step.summary));
                }
            }
        }
        None => lines.push(palette.dim("ledger:  none (run `logbook init`)")),
    }

    let hint = match report.state {
        LifecycleState::Idle => "run `logbook check` to start a checkpoint",
        LifecycleState::AwaitingInput => "fill in the draft, then `logbook commit`",
        _ => "run `logbook clean` to reset",
    };
    lines.push(palette.dim(hint));
    lines
}

pub(crate) fn run_lint(config: LogbookConfig, args: &PathArgs) -> anyhow::Result<i32> {
    let lc = lifecycle(config, args)?;
    let report = match lc.lint_draft() {
        Ok(report) => report,
        Err(err) => return Ok(report_failure(&lc, &err)),
    };
    let palette = Palette::stdout();

    if report.is_valid() {
        println!("{} draft is valid", palette.ok("ok:"));
    } else {
        println!("{}", palette.error(&format!("{} error(s):", report.errors.len())));
        for error in &report.errors {
            println!("  - {error}");
        }
    }
    print_warnings(&report.warnings);

    Ok(if report.is_valid() { 0 } else { 1 })
}
