//! Draft skeletons, diff statistics and commit messages.

use logbook_ledger::codec::{self, CodecError};
use logbook_ledger::{Change, CheckpointRecord, FileChange, NextStep};
use serde::Serialize;

/// Placeholder left in the skeleton's first change summary.
pub const PLACEHOLDER_SUMMARY: &str = "{{summary of the change}}";

/// Placeholder left in the skeleton's first change type.
pub const PLACEHOLDER_CHANGE_TYPE: &str = "{{feature|fix|refactor|docs|perf|other}}";

const PREAMBLE: &str = "\
# logbook draft: describe what changed, then run `logbook commit`.
#   change_type: feature | fix | refactor | docs | perf | other
#   next_steps[].priority: low | med | high
#   summaries: at most 80 characters, no {{placeholders}}
# git_status and diff_file are context only and never reach the ledger.
";

/// Editable in-progress record.
///
/// Serialized into the draft sentinel. Reading it back goes through
/// [`parse`], which keeps only the durable record fields.
#[derive(Debug, Clone, Serialize)]
pub struct Draft {
    #[serde(flatten)]
    pub record: CheckpointRecord,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub git_status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_file: Option<String>,
}

impl Draft {
    /// Skeleton with placeholders, carried-forward next steps and
    /// per-file line counts.
    pub fn skeleton(
        git_status: &str,
        diff_file: Option<String>,
        next_steps: Vec<NextStep>,
        files_changed: Vec<FileChange>,
    ) -> Self {
        let mut record = CheckpointRecord::new(vec![Change {
            summary: PLACEHOLDER_SUMMARY.to_string(),
            details: None,
            change_type: PLACEHOLDER_CHANGE_TYPE.to_string(),
            scope: None,
        }]);
        record.next_steps = next_steps;
        record.files_changed = files_changed;

        Self {
            record,
            git_status: git_status.trim_end().to_string(),
            diff_file,
        }
    }

    /// Text written to the draft sentinel.
    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        Ok(format!("{PREAMBLE}{}", serde_yaml::to_string(self)?))
    }
}

/// Decode a draft into the durable record, dropping draft-only fields.
pub fn parse(text: &str) -> Result<CheckpointRecord, CodecError> {
    codec::decode(text)
}

/// Per-file added/removed line counts from a unified diff.
pub fn diffstat(diff: &str) -> Vec<FileChange> {
    let mut files: Vec<FileChange> = Vec::new();
    let mut in_hunk = false;

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            in_hunk = false;
            let path = rest
                .rsplit_once(" b/")
                .map(|(_, b)| b)
                .unwrap_or(rest)
                .to_string();
            files.push(FileChange {
                path,
                added: 0,
                removed: 0,
            });
            continue;
        }

        let Some(current) = files.last_mut() else {
            continue;
        };

        if line.starts_with("@@") {
            in_hunk = true;
        } else if !in_hunk {
            if let Some(path) = line.strip_prefix("+++ b/") {
                current.path = path.to_string();
            }
        } else if line.starts_with('+') {
            current.added += 1;
        } else if line.starts_with('-') {
            current.removed += 1;
        }
    }

    files
}

/// Conventional-commit message for a validated record.
///
/// The first change becomes the subject; any further changes are listed
/// in the body.
pub fn commit_message(record: &CheckpointRecord, subject_prefix: Option<&str>) -> String {
    let prefix = subject_prefix.unwrap_or_default();
    let Some((first, rest)) = record.changes.split_first() else {
        return format!("{prefix}chore: checkpoint");
    };

    let mut message = format!("{prefix}{}", conventional_line(first));
    if !rest.is_empty() {
        message.push_str("\n\n");
        let body = rest
            .iter()
            .map(|change| format!("- {}", conventional_line(change)))
            .collect::<Vec<_>>()
            .join("\n");
        message.push_str(&body);
    }
    message
}

fn conventional_line(change: &Change) -> String {
    let kind = match change.change_type.as_str() {
        "feature" => "feat",
        "other" => "chore",
        other => other,
    };
    match change.scope.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(scope) => format!("{kind}({scope}): {}", change.summary),
        None => format!("{kind}: {}", change.summary),
    }
}

/// Paths named by `git status --short` output, minus `excluded` names.
pub fn status_paths(status: &str, excluded: &[&str]) -> Vec<String> {
    let mut paths: Vec<String> = status
        .lines()
        .filter(|line| !line.starts_with("##"))
        .filter_map(|line| line.get(3..))
        .map(|path| {
            path.rsplit_once(" -> ")
                .map(|(_, to)| to)
                .unwrap_or(path)
                .trim_matches('"')
                .to_string()
        })
        .filter(|path| !path.is_empty() && !excluded.contains(&path.as_str()))
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use logbook_ledger::{ChangeType, validate};
    use pretty_assertions::assert_eq;

    const DIFF: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 1111111..2222222 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,4 @@
 fn a() {}
-fn b() {}
+fn b() -> u8 { 1 }
+fn c() {}
diff --git a/old.txt b/old.txt
deleted file mode 100644
--- a/old.txt
+++ /dev/null
@@ -1,2 +0,0 @@
-one
----two
";

    #[test]
    fn diffstat_counts_hunk_lines_only() {
        let stats = diffstat(DIFF);
        assert_eq!(
            stats,
            vec![
                FileChange {
                    path: "src/lib.rs".into(),
                    added: 2,
                    removed: 1,
                },
                FileChange {
                    path: "old.txt".into(),
                    added: 0,
                    removed: 2,
                },
            ]
        );
    }

    #[test]
    fn skeleton_fails_validation_until_filled() {
        let draft = Draft::skeleton(" M src/lib.rs\n", Some(".logbook.diff".into()), vec![], vec![]);
        let text = draft.render().expect("render");
        assert!(text.starts_with("# logbook draft"));
        assert!(text.contains("git_status"));

        let record = parse(&text).expect("parse");
        let errors = validate(&record).unwrap_err();
        assert!(errors.errors.iter().any(|e| e.field == "changes[0].summary"));
        assert!(errors.errors.iter().any(|e| e.field == "changes[0].change_type"));
    }

    #[test]
    fn parsed_draft_drops_transient_fields() {
        let mut draft = Draft::skeleton("## main\n M a.rs", Some(".logbook.diff".into()), vec![], vec![]);
        draft.record.changes = vec![Change::new("Add login form", ChangeType::Feature)];
        let record = parse(&draft.render().expect("render")).expect("parse");

        let encoded = codec::encode(&record).expect("encode");
        assert!(!encoded.contains("git_status"));
        assert!(!encoded.contains("diff_file"));
        assert_eq!(record.changes[0].summary, "Add login form");
    }

    #[test]
    fn commit_message_uses_first_change_as_subject() {
        let mut record = CheckpointRecord::new(vec![
            Change::new("Add login form", ChangeType::Feature),
            Change::new("Correct typo in README", ChangeType::Docs),
        ]);
        record.changes[0].scope = Some("auth".into());

        assert_eq!(
            commit_message(&record, Some("[logbook] ")),
            "[logbook] feat(auth): Add login form\n\n- docs: Correct typo in README"
        );
    }

    #[test]
    fn commit_message_single_change_has_no_body() {
        let record = CheckpointRecord::new(vec![Change::new("Drop dead code", ChangeType::Other)]);
        assert_eq!(commit_message(&record, None), "chore: Drop dead code");
    }

    #[test]
    fn status_paths_skip_branch_line_and_excluded() {
        let status = "## main\n M src/lib.rs\n?? .logbook.lock\nR  old.rs -> new.rs\n?? \"with space.txt\"\n";
        assert_eq!(
            status_paths(status, &[".logbook.lock"]),
            vec![
                "new.rs".to_string(),
                "src/lib.rs".to_string(),
                "with space.txt".to_string(),
            ]
        );
    }
}
