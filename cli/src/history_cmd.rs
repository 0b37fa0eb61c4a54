//! Read-only history commands: `log` and `query`.

use logbook_core::LogbookConfig;
use logbook_discovery::{DiscoveryError, DiscoveryService, ProjectSummary};
use logbook_ledger::{CheckpointRecord, LedgerError, LedgerStore};

use crate::palette::Palette;
use crate::{EXIT_INFRA, LogArgs, QueryArgs, project_dir};

/// Missing ledger, unknown project and similar "wrong state" answers.
const EXIT_STATE: i32 = 2;

pub(crate) fn run_log(config: LogbookConfig, args: &LogArgs) -> anyhow::Result<i32> {
    let dir = project_dir(args.target.path.as_deref())?;
    let store = LedgerStore::new(dir.join(&config.ledger_file));
    let palette = Palette::stderr();

    let mut records = match store.read_records() {
        Ok(records) => records,
        Err(err @ LedgerError::NotInitialized { .. }) => {
            eprintln!("{} {err}", palette.error("error:"));
            eprintln!("{} run `logbook init` or `logbook check` first", palette.warn("next:"));
            return Ok(EXIT_STATE);
        }
        Err(err) => {
            eprintln!("{} {err}", palette.error("error:"));
            return Ok(EXIT_INFRA);
        }
    };

    records.reverse();
    if let Some(limit) = args.limit {
        records.truncate(limit);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(0);
    }

    if records.is_empty() {
        println!("no checkpoints recorded in {}", store.path().display());
        return Ok(0);
    }
    for record in &records {
        for line in render_record(record) {
            println!("{line}");
        }
    }
    Ok(0)
}

fn render_record(record: &CheckpointRecord) -> Vec<String> {
    let palette = Palette::stdout();
    let commit = if record.is_committed() {
        palette.warn(short_id(&record.commit_id))
    } else {
        palette.dim("uncommitted")
    };
    let when = record
        .timestamp
        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut lines = vec![format!("{commit} {when}")];
    for change in &record.changes {
        let scope = change
            .scope
            .as_deref()
            .map(|s| format!("({s})"))
            .unwrap_or_default();
        lines.push(format!("    {}{scope}: {}", change.change_type, change.summary));
    }
    for step in &record.next_steps {
        lines.push(palette.dim(&format!("    next: {}", step.summary)));
    }
    lines.push(String::new());
    lines
}

fn short_id(commit_id: &str) -> &str {
    commit_id.get(..10).unwrap_or(commit_id)
}

pub(crate) fn run_query(config: LogbookConfig, args: &QueryArgs) -> anyhow::Result<i32> {
    let roots = if args.roots.is_empty() {
        config.discovery.resolved_roots()
    } else {
        args.roots.clone()
    };
    let palette = Palette::stderr();

    if roots.is_empty() {
        eprintln!(
            "{} no discovery roots; pass --root DIR or set [discovery] roots in the config",
            palette.error("error:")
        );
        return Ok(EXIT_STATE);
    }

    let mut service = DiscoveryService::new(roots, config.ledger_file.clone());
    let summary = match service.query(&args.project_id) {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("{} {err}", palette.error("error:"));
            return Ok(match err {
                DiscoveryError::NotFound { .. } | DiscoveryError::DuplicateIdentity { .. } => {
                    EXIT_STATE
                }
                DiscoveryError::Ledger(_) => EXIT_INFRA,
            });
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in render_summary(&summary) {
            println!("{line}");
        }
    }
    Ok(0)
}

fn render_summary(summary: &ProjectSummary) -> Vec<String> {
    let mut lines = vec![
        format!("project: {}", summary.project_id),
        format!("path:    {}", summary.path.display()),
        format!("records: {}", summary.record_count),
    ];
    if let Some(ts) = summary.last_timestamp {
        lines.push(format!("last:    {}", ts.to_rfc3339()));
    }
    for step in &summary.next_steps {
        lines.push(format!("  next: {}", step.summary));
    }
    lines
}
