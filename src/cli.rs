//! Programmatic command runner shared by the `docbridge` binary and tests.

use bson::{Bson, Document};
use std::io::Write;

use crate::client::Client;
use crate::errors::DbError;

pub enum Command {
    Find { collection: String, filter_json: String, options_json: String, projection_json: String },
    FindAll { collection: String },
    FindOne { collection: String, filter_json: String },
    Insert { collection: String, doc_json: String },
    DeleteOne { collection: String, filter_json: String },
    DeleteMany { collection: String, filter_json: String },
    UpdateMany { collection: String, filter_json: String, update_json: String },
    Drop { collection: String },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputMode {
    /// One relaxed extended-JSON document per line.
    Json,
    /// Counts and ids only.
    Plain,
}

fn parse_doc(what: &str, json: &str) -> Result<Document, DbError> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Ok(Document::new());
    }
    let v: serde_json::Value = serde_json::from_str(trimmed)?;
    if !v.is_object() {
        return Err(DbError::InvalidArgument(format!("{what} must be a JSON object")));
    }
    Ok(bson::serialize_to_document(&v)?)
}

fn write_docs(out: &mut dyn Write, docs: &[Document], mode: OutputMode) -> Result<(), DbError> {
    match mode {
        OutputMode::Json => {
            for d in docs {
                let json = Bson::Document(d.clone()).into_relaxed_extjson();
                writeln!(out, "{json}")?;
            }
        }
        OutputMode::Plain => writeln!(out, "{}", docs.len())?,
    }
    Ok(())
}

/// Runs one command against `database` and writes its output.
///
/// # Errors
/// Returns the first decode, argument, store or I/O error.
pub fn run(
    client: &Client,
    database: &str,
    cmd: Command,
    mode: OutputMode,
    out: &mut dyn Write,
) -> Result<(), DbError> {
    match cmd {
        Command::Find { collection, filter_json, options_json, projection_json } => {
            let docs = client.find_with_limit_json(
                database,
                &collection,
                &filter_json,
                &options_json,
                &projection_json,
            )?;
            write_docs(out, &docs, mode)
        }
        Command::FindAll { collection } => {
            let docs = client.find_all(database, &collection)?;
            write_docs(out, &docs, mode)
        }
        Command::FindOne { collection, filter_json } => {
            let filter = Bson::Document(parse_doc("filter", &filter_json)?);
            let found: Vec<Document> = client.find_one(database, &collection, &filter)?.into_iter().collect();
            write_docs(out, &found, mode)
        }
        Command::Insert { collection, doc_json } => {
            let id = client.insert(database, &collection, parse_doc("document", &doc_json)?)?;
            match mode {
                OutputMode::Json => writeln!(out, "{}", serde_json::json!({ "inserted_id": id.into_relaxed_extjson() }))?,
                OutputMode::Plain => writeln!(out, "{id}")?,
            }
            Ok(())
        }
        Command::DeleteOne { collection, filter_json } => {
            let filter = Bson::Document(parse_doc("filter", &filter_json)?);
            let report = client.delete_one(database, &collection, &filter)?;
            write_count(out, mode, "deleted", report.deleted)
        }
        Command::DeleteMany { collection, filter_json } => {
            let filter = Bson::Document(parse_doc("filter", &filter_json)?);
            let deleted = client.delete_many(database, &collection, &filter)?;
            write_count(out, mode, "deleted", deleted)
        }
        Command::UpdateMany { collection, filter_json, update_json } => {
            let filter = Bson::Document(parse_doc("filter", &filter_json)?);
            let update = parse_doc("update", &update_json)?;
            let report = client.update_many(database, &collection, &filter, &update)?;
            match mode {
                OutputMode::Json => writeln!(
                    out,
                    "{}",
                    serde_json::json!({ "matched": report.matched, "modified": report.modified })
                )?,
                OutputMode::Plain => writeln!(out, "{} {}", report.matched, report.modified)?,
            }
            Ok(())
        }
        Command::Drop { collection } => {
            client.drop_collection(database, &collection)?;
            write_count(out, mode, "dropped", 1)
        }
    }
}

fn write_count(out: &mut dyn Write, mode: OutputMode, key: &str, n: u64) -> Result<(), DbError> {
    match mode {
        OutputMode::Json => writeln!(out, "{}", serde_json::json!({ key: n }))?,
        OutputMode::Plain => writeln!(out, "{n}")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn output(client: &Client, cmd: Command, mode: OutputMode) -> String {
        let mut buf = Vec::new();
        run(client, "db", cmd, mode, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn insert_find_update_delete_flow() {
        let client = Client::new(Arc::new(MemoryStore::new()));
        for (id, age) in [(1, 30), (2, 40), (3, 35)] {
            let cmd = Command::Insert { collection: "p".into(), doc_json: format!("{{\"_id\":{id},\"age\":{age}}}") };
            output(&client, cmd, OutputMode::Plain);
        }
        let found = output(
            &client,
            Command::Find {
                collection: "p".into(),
                filter_json: r#"{"age":{"$gt":30}}"#.into(),
                options_json: r#"{"sort":[{"field":"age","asc":false}]}"#.into(),
                projection_json: r#"{"_id":1}"#.into(),
            },
            OutputMode::Json,
        );
        let lines: Vec<&str> = found.lines().collect();
        assert_eq!(lines, vec![r#"{"_id":2}"#, r#"{"_id":3}"#]);

        let upd = output(
            &client,
            Command::UpdateMany {
                collection: "p".into(),
                filter_json: "{}".into(),
                update_json: r#"{"$inc":{"age":1}}"#.into(),
            },
            OutputMode::Plain,
        );
        assert_eq!(upd.trim(), "3 3");
        let del = output(
            &client,
            Command::DeleteMany { collection: "p".into(), filter_json: r#"{"age":{"$lt":40}}"#.into() },
            OutputMode::Json,
        );
        assert_eq!(del.trim(), r#"{"deleted":2}"#);
        let all = output(&client, Command::FindAll { collection: "p".into() }, OutputMode::Plain);
        assert_eq!(all.trim(), "1");
    }

    #[test]
    fn bad_options_surface_as_decode_error() {
        let client = Client::new(Arc::new(MemoryStore::new()));
        let mut buf = Vec::new();
        let err = run(
            &client,
            "db",
            Command::Find {
                collection: "p".into(),
                filter_json: "{}".into(),
                options_json: r#"{"limit":5,"bogus":true}"#.into(),
                projection_json: String::new(),
            },
            OutputMode::Json,
            &mut buf,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Decode(_)));
        assert!(buf.is_empty());
    }
}
