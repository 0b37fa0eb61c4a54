//! Read-only discovery of ledgers by project id.
//!
//! [`IdentityCache`] maps project ids to directories by scanning a set of
//! roots; [`DiscoveryService`] answers "where is project X and what is its
//! latest checkpoint".

#![deny(clippy::print_stdout, clippy::print_stderr)]

mod cache;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use logbook_ledger::{LedgerError, LedgerStore, NextStep};
use serde::Serialize;

pub use cache::IdentityCache;

/// Errors from discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("no ledger with project id {project_id} under {}", display_paths(.roots))]
    NotFound {
        project_id: String,
        roots: Vec<PathBuf>,
    },

    #[error("project id {project_id} is claimed by several ledgers: {}", display_paths(.paths))]
    DuplicateIdentity {
        project_id: String,
        paths: Vec<PathBuf>,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(no roots configured)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Answer to a discovery query.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub project_id: String,
    pub path: PathBuf,
    pub record_count: usize,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub next_steps: Vec<NextStep>,
}

/// Query front end over an [`IdentityCache`].
#[derive(Debug, Clone)]
pub struct DiscoveryService {
    cache: IdentityCache,
}

impl DiscoveryService {
    pub fn new(roots: Vec<PathBuf>, ledger_file: impl Into<String>) -> Self {
        Self {
            cache: IdentityCache::new(roots, ledger_file),
        }
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Locate `project_id` and summarize its ledger.
    pub fn query(&mut self, project_id: &str) -> Result<ProjectSummary, DiscoveryError> {
        let path = self.cache.resolve(project_id)?;
        let store = LedgerStore::new(path.join(self.cache.ledger_file()));
        let contents = store.read_ledger()?;
        let last = contents.last_record();

        Ok(ProjectSummary {
            project_id: project_id.to_string(),
            record_count: contents.records.len(),
            last_timestamp: last.and_then(|r| r.timestamp),
            next_steps: last.map(|r| r.next_steps.clone()).unwrap_or_default(),
            path,
        })
    }
}
