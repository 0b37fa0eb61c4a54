//! On-disk ledger store.
//!
//! The ledger is append-only. The only sanctioned rewrite is
//! [`LedgerStore::backfill_commit_id`] on the last record, performed as
//! read → verify → temp-file + fsync → verify → rename so that a second
//! writer is detected before the original file is touched.
//!
//! A rewrite re-encodes the record body, so comments interleaved with its
//! fields are lost. Comment and blank lines before the first field or after
//! the last one are kept.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::codec::{self, CodecError};
use crate::schema::{CheckpointRecord, IdentityHeader};

/// Errors from ledger store operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The ledger file does not exist yet.
    #[error("ledger not initialized at {path}")]
    NotInitialized { path: PathBuf },

    /// The file changed between observation and write.
    #[error("ledger at {path} was modified concurrently ({detail}); nothing was written")]
    ConcurrentModification { path: PathBuf, detail: String },

    /// There is no checkpoint record to rewrite.
    #[error("ledger at {path} has no checkpoint records")]
    NoRecords { path: PathBuf },

    /// The last record was already backfilled.
    #[error("last record in {path} already carries commit id {commit_id}")]
    CommitIdAlreadySet { path: PathBuf, commit_id: String },

    /// Backfill was asked to write an empty commit id.
    #[error("refusing to backfill an empty commit id into {path}")]
    EmptyCommitId { path: PathBuf },

    /// A document inside the ledger failed to decode.
    #[error("document {index} in {path} is invalid: {source}")]
    Document {
        path: PathBuf,
        index: usize,
        #[source]
        source: CodecError,
    },

    /// A document could not be encoded.
    #[error("failed to encode document for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    /// Filesystem I/O error.
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Result of [`LedgerStore::initialize`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitOutcome {
    /// A new ledger holding only the header was created.
    Created(IdentityHeader),
    /// A header-less ledger received a header; existing records kept.
    Upgraded {
        header: IdentityHeader,
        records: usize,
    },
    /// The ledger already had a header; nothing was written.
    AlreadyInitialized(IdentityHeader),
}

impl InitOutcome {
    pub fn header(&self) -> &IdentityHeader {
        match self {
            InitOutcome::Created(header)
            | InitOutcome::Upgraded { header, .. }
            | InitOutcome::AlreadyInitialized(header) => header,
        }
    }
}

/// Header plus records, in file order.
#[derive(Clone, Debug, Default)]
pub struct LedgerContents {
    pub header: Option<IdentityHeader>,
    pub records: Vec<CheckpointRecord>,
}

impl LedgerContents {
    pub fn last_record(&self) -> Option<&CheckpointRecord> {
        self.records.last()
    }
}

/// Size and modification time, used to detect a second writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

/// Handle on one ledger file.
#[derive(Clone, Debug)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Ensure the ledger exists and starts with an identity header.
    ///
    /// Safe to call repeatedly; a ledger that already has a header is left
    /// byte-for-byte untouched.
    pub fn initialize(&self, tool_version: &str) -> Result<InitOutcome, LedgerError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return self.create(tool_version);
            }
            Err(e) => return Err(self.io_err(e)),
        };
        let before = self.stamp()?;
        if before.len != text.len() as u64 {
            return Err(self.concurrent("size changed while reading"));
        }

        let spans = codec::split_spans(&text);
        if let Some(first) = spans.first()
            && let Some(header) = codec::decode_header(&text[first.clone()]).map_err(|source| {
                LedgerError::Document {
                    path: self.path.clone(),
                    index: 0,
                    source,
                }
            })?
        {
            tracing::debug!(path = %self.path.display(), "ledger already initialized");
            return Ok(InitOutcome::AlreadyInitialized(header));
        }

        let header = IdentityHeader::mint(&self.absolute_path(), tool_version);
        let mut upgraded = codec::encode_header(&header).map_err(|source| self.encode_err(source))?;
        if !codec::starts_with_delimiter(&text) && !text.trim().is_empty() {
            upgraded.push_str(codec::DOCUMENT_DELIMITER);
            upgraded.push('\n');
        }
        upgraded.push_str(&text);

        self.replace_verified(&upgraded, &before)?;
        tracing::info!(
            path = %self.path.display(),
            project_id = %header.project_id,
            records = spans.len(),
            "prepended identity header to legacy ledger"
        );
        Ok(InitOutcome::Upgraded {
            header,
            records: spans.len(),
        })
    }

    fn create(&self, tool_version: &str) -> Result<InitOutcome, LedgerError> {
        let header = IdentityHeader::mint(&self.absolute_path(), tool_version);
        let contents = codec::encode_header(&header).map_err(|source| self.encode_err(source))?;

        let tmp = self.write_temp(&contents)?;
        tmp.persist_noclobber(&self.path).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                self.concurrent("ledger was created by another process")
            } else {
                self.io_err(e.error)
            }
        })?;

        tracing::info!(
            path = %self.path.display(),
            project_id = %header.project_id,
            "created ledger"
        );
        Ok(InitOutcome::Created(header))
    }

    /// Append one record at the end of the ledger.
    pub fn append(&self, record: &CheckpointRecord) -> Result<(), LedgerError> {
        let observed = self.stamp()?;
        self.append_expecting(record, observed.len)
    }

    /// Append one record, failing unless the ledger is still `expected_len`
    /// bytes long once opened.
    pub fn append_expecting(
        &self,
        record: &CheckpointRecord,
        expected_len: u64,
    ) -> Result<(), LedgerError> {
        let document = codec::encode_document(record).map_err(|source| self.encode_err(source))?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.open_err(e))?;
        let actual_len = file.metadata().map_err(|e| self.io_err(e))?.len();
        if actual_len != expected_len {
            return Err(self.concurrent(&format!(
                "expected {expected_len} bytes, found {actual_len}"
            )));
        }

        let mut payload = String::with_capacity(document.len() + 1);
        if actual_len > 0 && !ends_with_newline(&mut file, actual_len).map_err(|e| self.io_err(e))? {
            payload.push('\n');
        }
        payload.push_str(&document);

        file.write_all(payload.as_bytes())
            .map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;

        tracing::debug!(
            path = %self.path.display(),
            bytes = payload.len(),
            changes = record.changes.len(),
            "appended checkpoint record"
        );
        Ok(())
    }

    /// Rewrite the last checkpoint record through `mutate`.
    ///
    /// The header is never eligible. Every byte outside the last record's
    /// body is preserved.
    pub fn update_last<F>(&self, mutate: F) -> Result<CheckpointRecord, LedgerError>
    where
        F: FnOnce(&mut CheckpointRecord),
    {
        self.rewrite_last(|record| {
            mutate(record);
            Ok(())
        })
    }

    /// Write `commit_id` into the last record.
    ///
    /// This is the only mutation of existing history. It refuses to replace
    /// a commit id that is already present.
    pub fn backfill_commit_id(&self, commit_id: &str) -> Result<CheckpointRecord, LedgerError> {
        let commit_id = commit_id.trim();
        if commit_id.is_empty() {
            return Err(LedgerError::EmptyCommitId {
                path: self.path.clone(),
            });
        }
        let record = self.rewrite_last(|record| {
            if record.is_committed() {
                return Err(LedgerError::CommitIdAlreadySet {
                    path: self.path.clone(),
                    commit_id: record.commit_id.clone(),
                });
            }
            record.commit_id = commit_id.to_string();
            Ok(())
        })?;
        tracing::info!(path = %self.path.display(), commit_id, "backfilled commit id");
        Ok(record)
    }

    fn rewrite_last<F>(&self, mutate: F) -> Result<CheckpointRecord, LedgerError>
    where
        F: FnOnce(&mut CheckpointRecord) -> Result<(), LedgerError>,
    {
        let before = self.stamp()?;
        let text = fs::read_to_string(&self.path).map_err(|e| self.open_err(e))?;
        if text.len() as u64 != before.len || self.stamp()? != before {
            return Err(self.concurrent("changed while reading"));
        }

        let spans = codec::split_spans(&text);
        let (index, span) = self.last_record_span(&text, &spans)?;
        let mut record = codec::decode(&text[span.clone()]).map_err(|source| {
            LedgerError::Document {
                path: self.path.clone(),
                index,
                source,
            }
        })?;
        mutate(&mut record)?;
        let body = codec::encode(&record).map_err(|source| self.encode_err(source))?;
        let fields = field_lines(&text[span.clone()]);

        let mut rewritten = String::with_capacity(text.len() + body.len());
        rewritten.push_str(&text[..span.start + fields.start]);
        rewritten.push_str(&body);
        rewritten.push_str(&text[span.start + fields.end..]);

        self.replace_verified(&rewritten, &before)?;
        Ok(record)
    }

    fn last_record_span(
        &self,
        text: &str,
        spans: &[Range<usize>],
    ) -> Result<(usize, Range<usize>), LedgerError> {
        let no_records = || LedgerError::NoRecords {
            path: self.path.clone(),
        };
        let index = spans.len().checked_sub(1).ok_or_else(no_records)?;
        let span = spans[index].clone();
        if index == 0 && codec::is_header_document(&text[span.clone()]) {
            return Err(no_records());
        }
        Ok((index, span))
    }

    /// Read the identity header, if the ledger exists and starts with one.
    pub fn read_header(&self) -> Result<Option<IdentityHeader>, LedgerError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let Some(first) = codec::split_documents(&text).into_iter().next() else {
            return Ok(None);
        };
        codec::decode_header(first).map_err(|source| LedgerError::Document {
            path: self.path.clone(),
            index: 0,
            source,
        })
    }

    /// Linear scan of the whole ledger.
    pub fn read_ledger(&self) -> Result<LedgerContents, LedgerError> {
        let text = fs::read_to_string(&self.path).map_err(|e| self.open_err(e))?;
        let mut contents = LedgerContents::default();

        for (index, doc) in codec::split_documents(&text).into_iter().enumerate() {
            let doc_err = |source| LedgerError::Document {
                path: self.path.clone(),
                index,
                source,
            };
            if index == 0
                && let Some(header) = codec::decode_header(doc).map_err(doc_err)?
            {
                contents.header = Some(header);
                continue;
            }
            contents.records.push(codec::decode(doc).map_err(doc_err)?);
        }

        Ok(contents)
    }

    /// All checkpoint records in append order.
    pub fn read_records(&self) -> Result<Vec<CheckpointRecord>, LedgerError> {
        Ok(self.read_ledger()?.records)
    }

    fn stamp(&self) -> Result<FileStamp, LedgerError> {
        let metadata = fs::metadata(&self.path).map_err(|e| self.open_err(e))?;
        Ok(FileStamp {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    fn write_temp(&self, contents: &str) -> Result<tempfile::NamedTempFile, LedgerError> {
        let dir = self.parent_dir();
        let mut tmp = tempfile::Builder::new()
            .prefix(".logbook-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| LedgerError::Io {
                path: dir.clone(),
                source: e,
            })?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| self.io_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_err(e))?;
        Ok(tmp)
    }

    /// Atomically replace the ledger, provided it still matches `expected`.
    fn replace_verified(&self, contents: &str, expected: &FileStamp) -> Result<(), LedgerError> {
        let tmp = self.write_temp(contents)?;

        // The temp file is removed on drop if we bail out here.
        if self.stamp()? != *expected {
            return Err(self.concurrent("changed before replace"));
        }

        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        Ok(())
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn absolute_path(&self) -> PathBuf {
        std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone())
    }

    fn concurrent(&self, detail: &str) -> LedgerError {
        tracing::warn!(path = %self.path.display(), detail, "concurrent ledger modification");
        LedgerError::ConcurrentModification {
            path: self.path.clone(),
            detail: detail.to_string(),
        }
    }

    fn open_err(&self, e: io::Error) -> LedgerError {
        if e.kind() == io::ErrorKind::NotFound {
            LedgerError::NotInitialized {
                path: self.path.clone(),
            }
        } else {
            self.io_err(e)
        }
    }

    fn io_err(&self, e: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source: e,
        }
    }

    fn encode_err(&self, source: CodecError) -> LedgerError {
        LedgerError::Encode {
            path: self.path.clone(),
            source,
        }
    }
}

fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Range of `doc` from its first to its last non-comment line, inclusive
/// of that line's newline.
fn field_lines(doc: &str) -> Range<usize> {
    let mut first = None;
    let mut last_end = doc.len();
    let mut offset = 0;
    for line in doc.split_inclusive('\n') {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            if first.is_none() {
                first = Some(offset);
            }
            last_end = offset + line.len();
        }
        offset += line.len();
    }
    first.unwrap_or(0)..last_end
}
