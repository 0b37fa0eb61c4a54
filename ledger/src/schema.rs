//! Ledger document types.
//!
//! A ledger holds one [`IdentityHeader`] followed by zero or more
//! [`CheckpointRecord`]s. Records are the durable subset of what a user
//! edits in the draft; draft-only fields live in `logbook-core`.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Schema version written into every new header and record.
pub const SCHEMA_VERSION: &str = "logbook@1";

/// Value of `document_kind` that marks the identity header.
pub const META_KIND: &str = "meta";

/// Maximum length of any change or next-step summary, in characters.
pub const MAX_SUMMARY_CHARS: usize = 80;

/// Number of hex characters kept from the path digest.
const PATH_HASH_LEN: usize = 12;

/// First document of every ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityHeader {
    pub schema_version: String,
    /// Always [`META_KIND`].
    pub document_kind: String,
    /// ULID minted once when the ledger is created.
    pub project_id: String,
    /// Advisory fingerprint of the ledger's absolute path.
    pub path_hash: String,
    pub created_at: DateTime<Utc>,
    /// Version of the tool that created the ledger. Informational only.
    pub tool_version: String,
}

impl IdentityHeader {
    /// Mint a header for a ledger at `ledger_path` with a fresh project id.
    pub fn mint(ledger_path: &Path, tool_version: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            document_kind: META_KIND.to_string(),
            project_id: ulid::Ulid::new().to_string(),
            path_hash: path_hash(ledger_path),
            created_at: Utc::now(),
            tool_version: tool_version.to_string(),
        }
    }
}

/// Short SHA-256 fingerprint of a path, used for collision hints.
pub fn path_hash(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(PATH_HASH_LEN);
    encoded
}

/// One durable ledger entry, appended per successful commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Set when the record is finalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Empty until the paired commit succeeds.
    #[serde(default)]
    pub commit_id: String,
    pub changes: Vec<Change>,
    #[serde(default)]
    pub next_steps: Vec<NextStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<FileChange>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl CheckpointRecord {
    /// Create an unstamped record with the given changes.
    pub fn new(changes: Vec<Change>) -> Self {
        Self {
            schema_version: default_schema_version(),
            timestamp: None,
            commit_id: String::new(),
            changes,
            next_steps: Vec::new(),
            files_changed: Vec::new(),
        }
    }

    /// Whether the commit id has already been backfilled.
    pub fn is_committed(&self) -> bool {
        !self.commit_id.is_empty()
    }
}

/// A single change described by a record.
///
/// `change_type` stays a string so that an unknown value reaches
/// validation instead of failing the parse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub change_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Change {
    pub fn new(summary: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            summary: summary.into(),
            details: None,
            change_type: change_type.as_str().to_string(),
            scope: None,
        }
    }
}

/// Follow-up work carried forward between checkpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStep {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Per-file line counts, informational only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(default)]
    pub added: u64,
    #[serde(default)]
    pub removed: u64,
}

/// Closed set of change kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Feature,
    Fix,
    Refactor,
    Docs,
    Perf,
    Other,
}

impl ChangeType {
    pub const ALL: [ChangeType; 6] = [
        ChangeType::Feature,
        ChangeType::Fix,
        ChangeType::Refactor,
        ChangeType::Docs,
        ChangeType::Perf,
        ChangeType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Feature => "feature",
            ChangeType::Fix => "fix",
            ChangeType::Refactor => "refactor",
            ChangeType::Docs => "docs",
            ChangeType::Perf => "perf",
            ChangeType::Other => "other",
        }
    }

    /// Exact, case-sensitive match against the serialized names.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of next-step priorities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Med,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Med => "med",
            Priority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Priority::Low),
            "med" => Some(Priority::Med),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn change_type_parse_is_exact() {
        assert_eq!(ChangeType::parse("feature"), Some(ChangeType::Feature));
        assert_eq!(ChangeType::parse("perf"), Some(ChangeType::Perf));
        assert_eq!(ChangeType::parse("Feature"), None);
        assert_eq!(ChangeType::parse("chore"), None);
    }

    #[test]
    fn priority_parse_rejects_long_forms() {
        assert_eq!(Priority::parse("med"), Some(Priority::Med));
        assert_eq!(Priority::parse("medium"), None);
    }

    #[test]
    fn path_hash_is_short_and_deterministic() {
        let a = path_hash(&PathBuf::from("/work/project/LOGBOOK.yaml"));
        let b = path_hash(&PathBuf::from("/work/project/LOGBOOK.yaml"));
        let c = path_hash(&PathBuf::from("/work/other/LOGBOOK.yaml"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn minted_header_has_ulid_project_id() {
        let header = IdentityHeader::mint(&PathBuf::from("/tmp/LOGBOOK.yaml"), "0.1.0");
        assert_eq!(header.document_kind, META_KIND);
        assert_eq!(header.project_id.len(), 26);
        let other = IdentityHeader::mint(&PathBuf::from("/tmp/LOGBOOK.yaml"), "0.1.0");
        assert_ne!(header.project_id, other.project_id);
    }
}
