//! `project_id → directory` cache rebuilt by scanning root directories.
//!
//! The cache is soft: every hit is re-checked against the on-disk header,
//! and any mismatch triggers a full rescan.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use logbook_ledger::LedgerStore;
use walkdir::WalkDir;

use crate::DiscoveryError;

/// Identity cache over a fixed set of roots.
#[derive(Debug, Clone)]
pub struct IdentityCache {
    roots: Vec<PathBuf>,
    ledger_file: String,
    entries: HashMap<String, PathBuf>,
    duplicates: HashMap<String, Vec<PathBuf>>,
}

impl IdentityCache {
    pub fn new(roots: Vec<PathBuf>, ledger_file: impl Into<String>) -> Self {
        Self {
            roots,
            ledger_file: ledger_file.into(),
            entries: HashMap::new(),
            duplicates: HashMap::new(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn ledger_file(&self) -> &str {
        &self.ledger_file
    }

    /// Number of uniquely resolvable ids from the last scan.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Project directory holding the ledger with `project_id`.
    pub fn resolve(&mut self, project_id: &str) -> Result<PathBuf, DiscoveryError> {
        if let Some(dir) = self.entries.get(project_id) {
            if self.header_matches(dir, project_id) {
                tracing::debug!(project_id, dir = %dir.display(), "identity cache hit");
                return Ok(dir.clone());
            }
            tracing::info!(project_id, dir = %dir.display(), "cached identity is stale, rescanning");
        }

        self.rescan();

        if let Some(paths) = self.duplicates.get(project_id) {
            return Err(DiscoveryError::DuplicateIdentity {
                project_id: project_id.to_string(),
                paths: paths.clone(),
            });
        }
        self.entries
            .get(project_id)
            .cloned()
            .ok_or_else(|| DiscoveryError::NotFound {
                project_id: project_id.to_string(),
                roots: self.roots.clone(),
            })
    }

    /// Drop everything and walk every root again.
    pub fn rescan(&mut self) {
        // Overlapping roots reach the same directory more than once.
        let mut found: HashMap<String, BTreeSet<PathBuf>> = HashMap::new();
        for root in &self.roots {
            self.scan_root(root, &mut found);
        }

        self.entries.clear();
        self.duplicates.clear();
        for (project_id, dirs) in found {
            let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
            if dirs.len() == 1 {
                if let Some(dir) = dirs.pop() {
                    self.entries.insert(project_id, dir);
                }
            } else {
                tracing::warn!(%project_id, count = dirs.len(), "project id found in several ledgers");
                self.duplicates.insert(project_id, dirs);
            }
        }
        tracing::debug!(
            resolvable = self.entries.len(),
            duplicated = self.duplicates.len(),
            "identity scan complete"
        );
    }

    fn scan_root(&self, root: &Path, found: &mut HashMap<String, BTreeSet<PathBuf>>) {
        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.file_type().is_dir() && e.file_name() != ".git");

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable directory");
                    continue;
                }
            };

            let ledger_path = entry.path().join(&self.ledger_file);
            if !ledger_path.is_file() {
                continue;
            }
            // A project's subdirectories are never separate projects.
            walker.skip_current_dir();

            match LedgerStore::new(&ledger_path).read_header() {
                Ok(Some(header)) => {
                    found
                        .entry(header.project_id)
                        .or_default()
                        .insert(entry.path().to_path_buf());
                }
                Ok(None) => {
                    tracing::debug!(path = %ledger_path.display(), "ledger has no identity header");
                }
                Err(err) => {
                    tracing::warn!(path = %ledger_path.display(), error = %err, "unreadable ledger header");
                }
            }
        }
    }

    fn header_matches(&self, dir: &Path, project_id: &str) -> bool {
        LedgerStore::new(dir.join(&self.ledger_file))
            .read_header()
            .ok()
            .flatten()
            .is_some_and(|h| h.project_id == project_id)
    }
}
