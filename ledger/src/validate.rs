//! Record validation (hard gate) and lint (advisory).
//!
//! Both functions are pure: they only look at the in-memory record.

use std::fmt;

use crate::schema::{ChangeType, CheckpointRecord, MAX_SUMMARY_CHARS, Priority};

/// Opening marker of an unresolved template placeholder.
pub const PLACEHOLDER_OPEN: &str = "{{";
/// Closing marker of an unresolved template placeholder.
pub const PLACEHOLDER_CLOSE: &str = "}}";

/// Words that mark a field as unfinished when linting.
const PLACEHOLDER_WORDS: &[&str] = &["TODO", "TBD", "FIXME", "XXX"];

/// Low-information leading verbs.
const VAGUE_VERBS: &[&str] = &[
    "update", "updated", "updates", "fix", "fixed", "fixes", "change", "changed", "changes",
    "tweak", "tweaks", "misc", "stuff", "wip", "cleanup", "improve", "improved", "edit",
    "modify", "work",
];

/// Summaries this short (in words) are vague when they start with a stoplist verb.
const VAGUE_MAX_WORDS: usize = 3;

const CONJUNCTIONS: &[&str] = &["and", "also", "plus", "then"];

/// Conjunction count at which a summary probably describes several changes.
const CONJUNCTION_THRESHOLD: usize = 2;

/// A single structural problem with a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path to the offending field, e.g. `changes[1].change_type`.
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every structural problem found in a record.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("record failed validation with {} error(s): {}", .errors.len(), join(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Kind of advisory warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LintKind {
    Placeholder,
    VagueSummary,
    CompoundSummary,
}

/// Advisory finding that never blocks an append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LintWarning {
    pub kind: LintKind,
    pub field: String,
    pub message: String,
}

impl fmt::Display for LintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check that `record` may be appended to the ledger.
pub fn validate(record: &CheckpointRecord) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    let mut push = |field: String, message: String| errors.push(FieldError { field, message });

    if record.schema_version.trim().is_empty() {
        push("schema_version".into(), "must not be empty".into());
    }

    if record.changes.is_empty() {
        push("changes".into(), "at least one change is required".into());
    }

    for (i, change) in record.changes.iter().enumerate() {
        if let Some(message) = summary_problem(&change.summary) {
            push(format!("changes[{i}].summary"), message);
        }
        if ChangeType::parse(&change.change_type).is_none() {
            push(
                format!("changes[{i}].change_type"),
                format!(
                    "'{}' is not one of {}",
                    change.change_type,
                    ChangeType::ALL.map(ChangeType::as_str).join(", ")
                ),
            );
        }
    }

    for (i, step) in record.next_steps.iter().enumerate() {
        if let Some(message) = summary_problem(&step.summary) {
            push(format!("next_steps[{i}].summary"), message);
        }
        if let Some(priority) = &step.priority
            && Priority::parse(priority).is_none()
        {
            push(
                format!("next_steps[{i}].priority"),
                format!("'{priority}' is not one of low, med, high"),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors { errors })
    }
}

fn summary_problem(summary: &str) -> Option<String> {
    let trimmed = summary.trim();
    if trimmed.is_empty() {
        return Some("must not be empty".into());
    }
    let chars = trimmed.chars().count();
    if chars > MAX_SUMMARY_CHARS {
        return Some(format!(
            "is {chars} characters, limit is {MAX_SUMMARY_CHARS}"
        ));
    }
    if has_placeholder(trimmed) {
        return Some("still contains a template placeholder".into());
    }
    None
}

/// Whether `text` carries an unresolved `{{...}}` marker.
pub fn has_placeholder(text: &str) -> bool {
    text.contains(PLACEHOLDER_OPEN) || text.contains(PLACEHOLDER_CLOSE)
}

fn has_placeholder_word(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| PLACEHOLDER_WORDS.contains(&word))
}

/// Collect advisory warnings for `record`.
pub fn lint(record: &CheckpointRecord) -> Vec<LintWarning> {
    let mut warnings = Vec::new();

    for (i, change) in record.changes.iter().enumerate() {
        let base = format!("changes[{i}]");
        lint_placeholders(&base, "summary", Some(&change.summary), &mut warnings);
        lint_placeholders(&base, "details", change.details.as_deref(), &mut warnings);
        lint_placeholders(&base, "scope", change.scope.as_deref(), &mut warnings);
        lint_summary_wording(&format!("{base}.summary"), &change.summary, &mut warnings);
    }

    for (i, step) in record.next_steps.iter().enumerate() {
        let base = format!("next_steps[{i}]");
        lint_placeholders(&base, "summary", Some(&step.summary), &mut warnings);
        lint_placeholders(&base, "details", step.details.as_deref(), &mut warnings);
        lint_placeholders(&base, "scope", step.scope.as_deref(), &mut warnings);
    }

    warnings
}

fn lint_placeholders(
    base: &str,
    name: &str,
    value: Option<&str>,
    warnings: &mut Vec<LintWarning>,
) {
    let Some(value) = value else {
        return;
    };
    if has_placeholder(value) || has_placeholder_word(value) {
        warnings.push(LintWarning {
            kind: LintKind::Placeholder,
            field: format!("{base}.{name}"),
            message: "looks unfinished (placeholder marker)".into(),
        });
    }
}

fn lint_summary_wording(field: &str, summary: &str, warnings: &mut Vec<LintWarning>) {
    let words: Vec<String> = summary
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    if let Some(first) = words.first()
        && words.len() <= VAGUE_MAX_WORDS
        && VAGUE_VERBS.contains(&first.as_str())
    {
        warnings.push(LintWarning {
            kind: LintKind::VagueSummary,
            field: field.to_string(),
            message: format!("'{}' is vague; say what changed and where", summary.trim()),
        });
    }

    let conjunctions = words
        .iter()
        .filter(|w| CONJUNCTIONS.contains(&w.as_str()))
        .count()
        + summary.matches(';').count();
    if conjunctions >= CONJUNCTION_THRESHOLD {
        warnings.push(LintWarning {
            kind: LintKind::CompoundSummary,
            field: field.to_string(),
            message: "joins several actions; consider separate changes[] entries".into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Change, NextStep};
    use pretty_assertions::assert_eq;

    fn record(summary: &str, change_type: &str) -> CheckpointRecord {
        CheckpointRecord::new(vec![Change {
            summary: summary.into(),
            details: None,
            change_type: change_type.into(),
            scope: None,
        }])
    }

    fn step(summary: &str, priority: Option<&str>) -> NextStep {
        NextStep {
            summary: summary.into(),
            details: None,
            priority: priority.map(str::to_string),
            scope: None,
        }
    }

    #[test]
    fn valid_record_passes() {
        assert_eq!(validate(&record("Add login form", "feature")), Ok(()));
    }

    #[test]
    fn zero_changes_rejected() {
        let err = validate(&CheckpointRecord::new(vec![])).unwrap_err();
        assert_eq!(err.errors[0].field, "changes");
    }

    #[test]
    fn unknown_change_type_rejected() {
        let err = validate(&record("Add login", "chore")).unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].field, "changes[0].change_type");
        assert!(err.to_string().contains("chore"));
    }

    #[test]
    fn summary_limit_counts_characters() {
        let exactly = "é".repeat(MAX_SUMMARY_CHARS);
        assert!(validate(&record(&exactly, "docs")).is_ok());
        let over = "a".repeat(MAX_SUMMARY_CHARS + 1);
        let err = validate(&record(&over, "docs")).unwrap_err();
        assert!(err.errors[0].message.contains("81 characters"));
    }

    #[test]
    fn blank_and_placeholder_summaries_rejected() {
        assert!(validate(&record("   ", "fix")).is_err());
        assert!(validate(&record("{{summary of the change}}", "fix")).is_err());
    }

    #[test]
    fn all_errors_are_collected() {
        let mut rec = record("", "nope");
        rec.next_steps.push(step("Write docs", Some("urgent")));
        let err = validate(&rec).unwrap_err();
        let fields: Vec<&str> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "changes[0].summary",
                "changes[0].change_type",
                "next_steps[0].priority"
            ]
        );
    }

    #[test]
    fn next_step_priority_optional() {
        let mut rec = record("Add login", "feature");
        rec.next_steps.push(step("Add logout", None));
        rec.next_steps.push(step("Add SSO", Some("high")));
        assert!(validate(&rec).is_ok());
    }

    #[test]
    fn lint_flags_vague_summary() {
        let warnings = lint(&record("Fixed stuff", "fix"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, LintKind::VagueSummary);
    }

    #[test]
    fn lint_accepts_specific_summary_starting_with_fix() {
        assert!(lint(&record("Fix off-by-one in ledger span splitting", "fix")).is_empty());
    }

    #[test]
    fn lint_flags_compound_summary() {
        let warnings = lint(&record("Add login and refactor db and update docs", "feature"));
        assert!(warnings.iter().any(|w| w.kind == LintKind::CompoundSummary));
    }

    #[test]
    fn lint_flags_placeholders_in_details() {
        let mut rec = record("Add login form", "feature");
        rec.changes[0].details = Some("TODO explain the session handling".into());
        let warnings = lint(&rec);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "changes[0].details");
    }

    #[test]
    fn lint_never_fails_an_invalid_record() {
        let warnings = lint(&CheckpointRecord::new(vec![]));
        assert!(warnings.is_empty());
    }
}
