use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::eval::{
    compare_bson, compare_docs, eval_filter, parse_filter, parse_projection, parse_sort,
    parse_update, project, apply_update,
};
use super::{DocumentStore, Namespace, StoreCursor};
use crate::errors::DbError;
use crate::query::{DeleteReport, InsertReport, NativeFind, UpdateReport};

#[derive(Default)]
struct Shared {
    collections: RwLock<HashMap<Namespace, Vec<Document>>>,
    open_cursors: AtomicUsize,
    closed: AtomicBool,
}

/// In-process document store. Collections keep insertion order as their natural order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cursors opened and not yet closed.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.shared.open_cursors.load(Ordering::SeqCst)
    }

    /// Number of documents in a collection (0 when it does not exist).
    #[must_use]
    pub fn count(&self, ns: &Namespace) -> usize {
        self.shared.collections.read().get(ns).map_or(0, Vec::len)
    }

    fn check_open(&self, ns: &Namespace) -> Result<(), DbError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(DbError::Store("client is disconnected".into()));
        }
        if ns.database.is_empty() || ns.collection.is_empty() {
            return Err(DbError::Store(format!("invalid namespace: {ns}")));
        }
        if ns.database.contains(['/', '\\', '.', ' ', '"', '$']) || ns.collection.starts_with("system.") {
            return Err(DbError::Store(format!("invalid namespace: {ns}")));
        }
        Ok(())
    }
}

fn with_id(doc: Document) -> Document {
    if doc.contains_key("_id") {
        return doc;
    }
    let mut out = Document::new();
    out.insert("_id", ObjectId::new());
    for (k, v) in doc {
        out.insert(k, v);
    }
    out
}

fn check_hint(hint: Option<&Document>) -> Result<(), DbError> {
    match hint {
        None => Ok(()),
        Some(h) if h.len() == 1 && matches!(h.get("_id"), Some(Bson::Int32(1) | Bson::Int64(1))) => Ok(()),
        Some(h) => Err(DbError::Store(format!("hint provided does not correspond to an existing index: {h}"))),
    }
}

/// Positions of matching documents, in `_id` order when hinted, natural order otherwise.
fn matching_positions(docs: &[Document], filter: &Document, hint: Option<&Document>) -> Result<Vec<usize>, DbError> {
    check_hint(hint)?;
    let f = parse_filter(filter)?;
    let mut pos: Vec<usize> = (0..docs.len()).filter(|&i| eval_filter(&docs[i], &f)).collect();
    if hint.is_some() {
        let null = Bson::Null;
        pos.sort_by(|&a, &b| {
            compare_bson(docs[a].get("_id").unwrap_or(&null), docs[b].get("_id").unwrap_or(&null))
        });
    }
    Ok(pos)
}

impl DocumentStore for MemoryStore {
    fn open_cursor(&self, ns: &Namespace, find: &NativeFind) -> Result<Box<dyn StoreCursor>, DbError> {
        self.check_open(ns)?;
        let filter = Document::from_reader(find.filter.as_slice())
            .map_err(|e| DbError::Store(format!("filter is not a valid document: {e}")))?;
        let filter = parse_filter(&filter)?;
        let sort = find.sort.as_deref().map(parse_sort).transpose()?;
        let projection = find.projection.as_ref().map(parse_projection).transpose()?;

        let mut docs: Vec<Document> = {
            let cols = self.shared.collections.read();
            cols.get(ns)
                .map(|c| c.iter().filter(|d| eval_filter(d, &filter)).cloned().collect())
                .unwrap_or_default()
        };
        if let Some(sort) = &sort {
            docs.sort_by(|a, b| compare_docs(a, b, sort));
        }
        // A negative limit behaves like its absolute value.
        if let Some(limit) = find.limit.filter(|l| *l != 0) {
            let n = usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX);
            docs.truncate(n);
        }
        if let Some(p) = &projection {
            docs = docs.iter().map(|d| project(d, p)).collect::<Result<_, _>>()?;
        }
        self.shared.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor { docs: docs.into_iter(), shared: self.shared.clone(), closed: false }))
    }

    fn insert_one(&self, ns: &Namespace, doc: Document) -> Result<Bson, DbError> {
        self.check_open(ns)?;
        let doc = with_id(doc);
        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        let mut cols = self.shared.collections.write();
        let col = cols.entry(ns.clone()).or_default();
        if col.iter().any(|d| d.get("_id") == Some(&id)) {
            return Err(DbError::Store(format!("duplicate key error: {ns} _id: {id}")));
        }
        col.push(doc);
        Ok(id)
    }

    fn insert_many(&self, ns: &Namespace, docs: Vec<Document>) -> Result<InsertReport, DbError> {
        self.check_open(ns)?;
        if docs.is_empty() {
            return Err(DbError::Store("insert_many requires at least one document".into()));
        }
        let mut report = InsertReport::default();
        for doc in docs {
            report.inserted_ids.push(self.insert_one(ns, doc)?);
        }
        Ok(report)
    }

    fn delete_one(&self, ns: &Namespace, filter: &Document, hint: Option<&Document>) -> Result<DeleteReport, DbError> {
        self.check_open(ns)?;
        let mut cols = self.shared.collections.write();
        let Some(col) = cols.get_mut(ns) else {
            check_hint(hint)?;
            parse_filter(filter)?;
            return Ok(DeleteReport::default());
        };
        let pos = matching_positions(col, filter, hint)?;
        Ok(match pos.first() {
            Some(&i) => {
                col.remove(i);
                DeleteReport { deleted: 1 }
            }
            None => DeleteReport::default(),
        })
    }

    fn delete_many(&self, ns: &Namespace, filter: &Document, hint: Option<&Document>) -> Result<DeleteReport, DbError> {
        self.check_open(ns)?;
        let mut cols = self.shared.collections.write();
        let Some(col) = cols.get_mut(ns) else {
            check_hint(hint)?;
            parse_filter(filter)?;
            return Ok(DeleteReport::default());
        };
        let mut pos = matching_positions(col, filter, hint)?;
        pos.sort_unstable();
        for &i in pos.iter().rev() {
            col.remove(i);
        }
        Ok(DeleteReport { deleted: pos.len() as u64 })
    }

    fn drop_collection(&self, ns: &Namespace) -> Result<(), DbError> {
        self.check_open(ns)?;
        self.shared.collections.write().remove(ns);
        Ok(())
    }

    fn update_many(&self, ns: &Namespace, filter: &Document, update: &Document) -> Result<UpdateReport, DbError> {
        self.check_open(ns)?;
        let upd = parse_update(update)?;
        let f = parse_filter(filter)?;
        let mut cols = self.shared.collections.write();
        let Some(col) = cols.get_mut(ns) else {
            return Ok(UpdateReport::default());
        };
        // Stage every change first so a failing document leaves the collection untouched.
        let mut staged = Vec::new();
        let mut report = UpdateReport::default();
        for (i, doc) in col.iter().enumerate() {
            if !eval_filter(doc, &f) {
                continue;
            }
            report.matched += 1;
            let mut next = doc.clone();
            if apply_update(&mut next, &upd)? {
                report.modified += 1;
                staged.push((i, next));
            }
        }
        for (i, next) in staged {
            col[i] = next;
        }
        Ok(report)
    }

    fn close(&self) -> Result<(), DbError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Err(DbError::Store("client is already disconnected".into()));
        }
        Ok(())
    }
}

struct MemoryCursor {
    docs: std::vec::IntoIter<Document>,
    shared: Arc<Shared>,
    closed: bool,
}

impl StoreCursor for MemoryCursor {
    fn advance(&mut self) -> Result<Option<Vec<u8>>, DbError> {
        if self.closed {
            return Err(DbError::Store("cursor is closed".into()));
        }
        let Some(doc) = self.docs.next() else {
            return Ok(None);
        };
        let mut buf = Vec::new();
        doc.to_writer(&mut buf)?;
        Ok(Some(buf))
    }

    fn close(&mut self) -> Result<(), DbError> {
        if !self.closed {
            self.closed = true;
            self.shared.open_cursors.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
