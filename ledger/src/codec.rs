//! Multi-document codec for the ledger file.
//!
//! Documents are YAML bodies separated by lines consisting solely of `---`.
//! A leading delimiter is optional, a trailing one is never required, and
//! documents containing only whitespace or comments are skipped.

use std::ops::Range;

use serde::Serialize;

use crate::schema::{CheckpointRecord, IdentityHeader, META_KIND};

/// Line that separates two documents.
pub const DOCUMENT_DELIMITER: &str = "---";

/// Errors from encoding or decoding a single document.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Document has no YAML content at all.
    #[error("document is empty")]
    Empty,

    /// Document is not valid YAML or does not match the expected shape.
    #[error("malformed document: {reason}")]
    Malformed { reason: String },

    /// A record was expected but the document is the identity header.
    #[error("expected a checkpoint record but found the identity header")]
    UnexpectedHeader,

    /// Serialization failure.
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Byte ranges of every non-empty document body in `text`.
///
/// Ranges exclude delimiter lines, so replacing one range leaves every
/// delimiter and every other document untouched.
pub fn split_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_end = offset + line.len();
        if is_delimiter(line) {
            push_if_content(text, start..offset, &mut spans);
            start = line_end;
        }
        offset = line_end;
    }
    push_if_content(text, start..text.len(), &mut spans);

    spans
}

/// Raw text of every non-empty document in `text`, in file order.
pub fn split_documents(text: &str) -> Vec<&str> {
    split_spans(text)
        .into_iter()
        .map(|span| &text[span])
        .collect()
}

/// Whether `text` starts with a delimiter line.
pub fn starts_with_delimiter(text: &str) -> bool {
    text.split_inclusive('\n').next().is_some_and(is_delimiter)
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == DOCUMENT_DELIMITER
}

fn push_if_content(text: &str, span: Range<usize>, spans: &mut Vec<Range<usize>>) {
    if has_content(&text[span.clone()]) {
        spans.push(span);
    }
}

fn has_content(doc: &str) -> bool {
    doc.lines().any(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}

fn parse_value(text: &str) -> Result<serde_yaml::Value, CodecError> {
    if !has_content(text) {
        return Err(CodecError::Empty);
    }
    serde_yaml::from_str(text).map_err(|e| CodecError::Malformed {
        reason: e.to_string(),
    })
}

fn is_meta(value: &serde_yaml::Value) -> bool {
    value
        .get("document_kind")
        .and_then(serde_yaml::Value::as_str)
        .is_some_and(|kind| kind == META_KIND)
}

/// Whether a raw document is the identity header.
///
/// Malformed documents are never headers.
pub fn is_header_document(text: &str) -> bool {
    parse_value(text).is_ok_and(|value| is_meta(&value))
}

/// Decode one checkpoint record.
pub fn decode(text: &str) -> Result<CheckpointRecord, CodecError> {
    let value = parse_value(text)?;
    if is_meta(&value) {
        return Err(CodecError::UnexpectedHeader);
    }
    if !value.is_mapping() {
        return Err(CodecError::Malformed {
            reason: "document is not a mapping".to_string(),
        });
    }
    serde_yaml::from_value(value).map_err(|e| CodecError::Malformed {
        reason: e.to_string(),
    })
}

/// Decode the identity header.
///
/// Returns `Ok(None)` when the document is valid YAML but not a header.
pub fn decode_header(text: &str) -> Result<Option<IdentityHeader>, CodecError> {
    let value = parse_value(text)?;
    if !is_meta(&value) {
        return Ok(None);
    }
    serde_yaml::from_value(value)
        .map(Some)
        .map_err(|e| CodecError::Malformed {
            reason: e.to_string(),
        })
}

/// Serialize a record body (no delimiter). Always ends with a newline.
pub fn encode(record: &CheckpointRecord) -> Result<String, CodecError> {
    to_yaml(record)
}

/// Serialize a record as a full document, delimiter included.
pub fn encode_document(record: &CheckpointRecord) -> Result<String, CodecError> {
    Ok(format!("{DOCUMENT_DELIMITER}\n{}", encode(record)?))
}

/// Serialize the header as a full document, delimiter included.
pub fn encode_header(header: &IdentityHeader) -> Result<String, CodecError> {
    Ok(format!("{DOCUMENT_DELIMITER}\n{}", to_yaml(header)?))
}

fn to_yaml<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let mut body = serde_yaml::to_string(value)?;
    if !body.ends_with('\n') {
        body.push('\n');
    }
    Ok(body)
}
