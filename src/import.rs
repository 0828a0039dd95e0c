//! Seeding collections from NDJSON or JSON-array files.

use bson::Document;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::client::Client;
use crate::errors::DbError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: u64,
    pub skipped: u64,
}

fn to_document(v: &serde_json::Value, line_no: usize) -> Result<Document, DbError> {
    if !v.is_object() {
        return Err(DbError::InvalidArgument(format!("record {line_no} is not a JSON object")));
    }
    Ok(bson::serialize_to_document(v)?)
}

/// Reads documents from `reader`. A leading `[` switches to JSON-array mode; otherwise one JSON
/// object per line, blank lines ignored.
///
/// # Errors
/// Returns an error on malformed input, unless `skip_errors` is set for line-level failures.
pub fn read_documents<R: Read>(reader: R, skip_errors: bool) -> Result<(Vec<Document>, u64), DbError> {
    let mut reader = BufReader::new(reader);
    let starts_with_bracket = {
        let buf = reader.fill_buf()?;
        buf.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'[')
    };
    if starts_with_bracket {
        let mut s = String::new();
        reader.read_to_string(&mut s)?;
        let val: serde_json::Value = serde_json::from_str(&s)?;
        let arr = val
            .as_array()
            .ok_or_else(|| DbError::InvalidArgument("expected JSON array".into()))?;
        let docs = arr.iter().enumerate().map(|(i, v)| to_document(v, i + 1)).collect::<Result<_, _>>()?;
        return Ok((docs, 0));
    }

    let mut docs = Vec::new();
    let mut skipped = 0u64;
    let mut line = String::with_capacity(8 * 1024);
    let mut line_no = 0usize;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<serde_json::Value>(trimmed)
            .map_err(DbError::from)
            .and_then(|v| to_document(&v, line_no));
        match parsed {
            Ok(d) => docs.push(d),
            Err(e) if skip_errors => {
                log::warn!("skipping line {line_no}: {e}");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok((docs, skipped))
}

/// Inserts every document of a file into `database.collection`.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, or the store rejects a document.
pub fn import_file(
    client: &Client,
    database: &str,
    collection: &str,
    path: &Path,
    skip_errors: bool,
) -> Result<ImportReport, DbError> {
    let file = std::fs::File::open(path)
        .map_err(|e| DbError::Io(format!("{}: {e}", path.display())))?;
    let (docs, skipped) = read_documents(file, skip_errors)?;
    if docs.is_empty() {
        return Ok(ImportReport { inserted: 0, skipped });
    }
    let report = client.insert_many(database, collection, docs)?;
    let inserted = report.inserted_ids.len() as u64;
    log::info!("imported {inserted} records into {database}.{collection} from {}", path.display());
    Ok(ImportReport { inserted, skipped })
}
