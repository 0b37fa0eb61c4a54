//! Ledger store behaviour against real files.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs;

use logbook_ledger::codec;
use logbook_ledger::{
    Change, ChangeType, CheckpointRecord, InitOutcome, LedgerError, LedgerStore, NextStep,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const TOOL_VERSION: &str = "0.1.0-test";

fn store_in(dir: &TempDir) -> LedgerStore {
    LedgerStore::new(dir.path().join("LOGBOOK.yaml"))
}

fn record(summary: &str) -> CheckpointRecord {
    CheckpointRecord::new(vec![Change::new(summary, ChangeType::Feature)])
}

fn read(store: &LedgerStore) -> String {
    fs::read_to_string(store.path()).expect("read ledger")
}

#[test]
fn happy_path_initialize_append_backfill() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);

    let outcome = store.initialize(TOOL_VERSION).expect("initialize");
    assert!(matches!(outcome, InitOutcome::Created(_)));
    assert_eq!(codec::split_documents(&read(&store)).len(), 1);

    store.append(&record("Add login")).expect("append");
    assert_eq!(codec::split_documents(&read(&store)).len(), 2);

    store.backfill_commit_id("abc123").expect("backfill");
    let text = read(&store);
    let docs = codec::split_documents(&text);
    assert_eq!(docs.len(), 2);
    assert!(docs[1].contains("commit_id: abc123"));

    let last = codec::decode(docs[1]).expect("decode last");
    assert_eq!(last.commit_id, "abc123");
    assert_eq!(last.changes[0].summary, "Add login");
}

#[test]
fn backfill_changes_only_the_commit_id_of_the_last_record() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    store.initialize(TOOL_VERSION).expect("initialize");

    for summary in ["First change", "Second change", "Third change"] {
        let mut rec = record(summary);
        rec.next_steps.push(NextStep {
            summary: format!("Follow up on {summary}"),
            details: Some("multi\nline\ndetails".into()),
            priority: Some("med".into()),
            scope: None,
        });
        store.append(&rec).expect("append");
    }
    let before = read(&store);

    store.backfill_commit_id("deadbeef").expect("backfill");
    let after = read(&store);

    let marker = "commit_id: ''";
    let at = before.rfind(marker).expect("last empty commit id");
    let expected = format!(
        "{}commit_id: deadbeef{}",
        &before[..at],
        &before[at + marker.len()..]
    );
    assert_eq!(after, expected);

    let records = store.read_records().expect("records");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].commit_id, "");
    assert_eq!(records[1].commit_id, "");
    assert_eq!(records[2].commit_id, "deadbeef");
}

#[test]
fn initialize_twice_is_byte_identical() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);

    let first = store.initialize(TOOL_VERSION).expect("first");
    let bytes = fs::read(store.path()).expect("bytes");

    let second = store.initialize(TOOL_VERSION).expect("second");
    assert!(matches!(second, InitOutcome::AlreadyInitialized(_)));
    assert_eq!(second.header(), first.header());
    assert_eq!(fs::read(store.path()).expect("bytes"), bytes);
    assert_eq!(codec::split_documents(&read(&store)).len(), 1);
}

#[test]
fn initialize_with_records_present_is_a_noop() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    store.initialize(TOOL_VERSION).expect("initialize");
    store.append(&record("Add login")).expect("append");
    let bytes = fs::read(store.path()).expect("bytes");

    store.initialize(TOOL_VERSION).expect("again");
    assert_eq!(fs::read(store.path()).expect("bytes"), bytes);
}

#[test]
fn legacy_ledger_gets_header_and_keeps_record_order() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let legacy = "\
changes:
- summary: Oldest
  change_type: fix
---
changes:
- summary: Middle
  change_type: docs
---
changes:
- summary: Newest
  change_type: perf
";
    fs::write(store.path(), legacy).expect("write legacy");

    let outcome = store.initialize(TOOL_VERSION).expect("initialize");
    assert!(matches!(outcome, InitOutcome::Upgraded { records: 3, .. }));

    let text = read(&store);
    assert!(text.starts_with("---\n"));
    assert!(text.ends_with(legacy));

    let contents = store.read_ledger().expect("read");
    let header = contents.header.expect("header present");
    assert_eq!(header.project_id.len(), 26);
    let summaries: Vec<&str> = contents
        .records
        .iter()
        .map(|r| r.changes[0].summary.as_str())
        .collect();
    assert_eq!(summaries, vec!["Oldest", "Middle", "Newest"]);
}

#[test]
fn append_after_file_without_trailing_newline_keeps_documents_apart() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    fs::write(store.path(), "changes:\n- summary: Legacy\n  change_type: fix").expect("write");
    store.initialize(TOOL_VERSION).expect("initialize");

    store.append(&record("Add login")).expect("append");
    let records = store.read_records().expect("records");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].changes[0].summary, "Legacy");
    assert_eq!(records[1].changes[0].summary, "Add login");
}

#[test]
fn append_rejects_size_change_and_leaves_file_alone() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    store.initialize(TOOL_VERSION).expect("initialize");
    let observed = fs::metadata(store.path()).expect("metadata").len();

    // Another writer sneaks in between observation and open.
    let mut raced = read(&store);
    raced.push_str("# touched by another process\n");
    fs::write(store.path(), &raced).expect("external write");

    let err = store
        .append_expecting(&record("Add login"), observed)
        .unwrap_err();
    assert!(matches!(err, LedgerError::ConcurrentModification { .. }));
    assert_eq!(read(&store), raced);
}

#[test]
fn append_to_missing_ledger_is_not_initialized() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let err = store.append(&record("Add login")).unwrap_err();
    assert!(matches!(err, LedgerError::NotInitialized { .. }));
    assert!(!store.exists());
}

#[test]
fn header_is_never_backfilled() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    store.initialize(TOOL_VERSION).expect("initialize");
    let bytes = read(&store);

    let err = store.backfill_commit_id("abc123").unwrap_err();
    assert!(matches!(err, LedgerError::NoRecords { .. }));
    assert_eq!(read(&store), bytes);
}

#[test]
fn backfill_refuses_second_commit_id() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    store.initialize(TOOL_VERSION).expect("initialize");
    store.append(&record("Add login")).expect("append");
    store.backfill_commit_id("abc123").expect("first backfill");
    let bytes = read(&store);

    let err = store.backfill_commit_id("def456").unwrap_err();
    assert!(matches!(err, LedgerError::CommitIdAlreadySet { ref commit_id, .. } if commit_id == "abc123"));
    assert_eq!(read(&store), bytes);
}

#[test]
fn update_last_applies_mutation() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    store.initialize(TOOL_VERSION).expect("initialize");
    store.append(&record("Add login")).expect("append");

    let updated = store
        .update_last(|rec| rec.commit_id = "cafe".into())
        .expect("update");
    assert_eq!(updated.commit_id, "cafe");
    assert_eq!(store.read_records().expect("records")[0].commit_id, "cafe");
}

#[test]
fn update_last_rejects_write_during_rewrite() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    store.initialize(TOOL_VERSION).expect("initialize");
    store.append(&record("Add login")).expect("append");

    let path = store.path().to_path_buf();
    let err = store
        .update_last(|rec| {
            rec.commit_id = "abc123".into();
            let mut other = fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .expect("open for other writer");
            std::io::Write::write_all(&mut other, b"# other\n").expect("other write");
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::ConcurrentModification { .. }));

    let text = read(&store);
    assert!(text.ends_with("# other\n"));
    assert!(!text.contains("abc123"));
}

#[test]
fn backfill_after_rejected_rewrite_keeps_other_writes() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    store.initialize(TOOL_VERSION).expect("initialize");
    store.append(&record("Add login")).expect("append");
    let before = read(&store);

    // The second writer lands between the read and the replace.
    let path = store.path().to_path_buf();
    let other = store.update_last(|_| {
        fs::write(&path, format!("{before}# other\n")).expect("other write");
    });
    assert!(matches!(other, Err(LedgerError::ConcurrentModification { .. })));

    let raced = read(&store);
    assert_eq!(raced, format!("{before}# other\n"));
    store.backfill_commit_id("abc123").expect("backfill after race");
    assert_eq!(
        read(&store),
        raced.replacen("commit_id: ''", "commit_id: abc123", 1)
    );
}

#[test]
fn backfill_keeps_comments_around_the_last_record() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    store.initialize(TOOL_VERSION).expect("initialize");
    store.append(&record("Add login")).expect("append");

    let annotated = format!("{}\n# reviewed by hand\n", read(&store));
    fs::write(store.path(), &annotated).expect("annotate");

    store.backfill_commit_id("abc123").expect("backfill");
    assert_eq!(
        read(&store),
        annotated.replacen("commit_id: ''", "commit_id: abc123", 1)
    );
}

#[test]
fn malformed_last_record_is_reported_not_coerced() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    store.initialize(TOOL_VERSION).expect("initialize");
    let mut text = read(&store);
    text.push_str("---\ncommit_id: ''\n");
    fs::write(store.path(), &text).expect("write");

    let err = store.backfill_commit_id("abc123").unwrap_err();
    assert!(matches!(err, LedgerError::Document { index: 1, .. }));
    assert_eq!(read(&store), text);
}

#[test]
fn read_header_missing_file_is_none() {
    let dir = TempDir::new().expect("temp dir");
    assert!(store_in(&dir).read_header().expect("read").is_none());
}

#[test]
fn read_header_legacy_file_is_none() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    fs::write(store.path(), "changes:\n- summary: x\n  change_type: fix\n").expect("write");
    assert!(store.read_header().expect("read").is_none());
}

#[test]
fn read_header_malformed_yaml_is_an_error() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    fs::write(store.path(), "---\ndocument_kind: [meta\n").expect("write");
    assert!(matches!(
        store.read_header(),
        Err(LedgerError::Document { index: 0, .. })
    ));
}

#[test]
fn header_records_absolute_path_fingerprint() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let outcome = store.initialize(TOOL_VERSION).expect("initialize");
    let header = outcome.header();
    assert_eq!(header.tool_version, TOOL_VERSION);
    assert_eq!(
        header.path_hash,
        logbook_ledger::schema::path_hash(store.path())
    );
}
