use bson::{Bson, Document, doc};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::DbError;
use crate::query::{
    self, DeleteReport, InsertReport, NativeFind, ResultSet, UpdateReport, compile,
    decode_options, decode_options_json,
};
use crate::store::{DocumentStore, Namespace};

/// Handle over a shared store connection. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn DocumentStore>,
    deadline: Option<Duration>,
}

fn id_hint() -> Document {
    doc! { "_id": 1 }
}

fn filter_document(filter: &Bson) -> Result<Document, DbError> {
    match filter {
        Bson::Document(d) => Ok(d.clone()),
        Bson::Null | Bson::Undefined => Ok(Document::new()),
        other => Err(DbError::InvalidArgument(format!("filter must be a document, got {other}"))),
    }
}

fn projection_document(projection: &Bson) -> Result<Option<Document>, DbError> {
    match projection {
        Bson::Document(d) => Ok(Some(d.clone())),
        Bson::Null | Bson::Undefined => Ok(None),
        other => Err(DbError::InvalidArgument(format!("projection must be a document, got {other}"))),
    }
}

fn parse_json_document(what: &str, json: &str) -> Result<Option<Document>, DbError> {
    let trimmed = json.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    let v: serde_json::Value = serde_json::from_str(trimmed)?;
    if !v.is_object() {
        return Err(DbError::InvalidArgument(format!("{what} must be a JSON object")));
    }
    Ok(Some(bson::serialize_to_document(&v)?))
}

impl Client {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, deadline: None }
    }

    /// Bounds every compiled find issued through this handle.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// # Errors
    /// Returns an error on any store-level failure.
    pub fn insert(&self, database: &str, collection: &str, doc: Document) -> Result<Bson, DbError> {
        let ns = Namespace::new(database, collection);
        let id = self.store.insert_one(&ns, doc)?;
        log::debug!("inserted {id} into {ns}");
        Ok(id)
    }

    /// # Errors
    /// Returns an error on the first document the store rejects.
    pub fn insert_many(&self, database: &str, collection: &str, docs: Vec<Document>) -> Result<InsertReport, DbError> {
        let ns = Namespace::new(database, collection);
        log::info!("inserting {} documents into {ns}", docs.len());
        self.store.insert_many(&ns, docs)
    }

    /// Unshaped find: the filter goes to the store as-is, no limit, sort or projection.
    ///
    /// # Errors
    /// Returns an error if the filter is rejected or the cursor fails.
    pub fn find(&self, database: &str, collection: &str, filter: &Bson) -> Result<ResultSet, DbError> {
        let ns = Namespace::new(database, collection);
        log::info!("filter is {filter}");
        let compiled = query::CompiledQuery { filter: filter_document(filter)?, ..Default::default() };
        Ok(query::execute(self.store.as_ref(), &ns, &compiled, self.deadline_instant())?)
    }

    /// Decodes `options`, compiles the query and materializes the result.
    ///
    /// `options` is `{limit?, sort?: [{field, asc}]}`; `projection` is a document or null.
    ///
    /// # Errors
    /// Returns `DbError::Decode` for bad options, `DbError::Execution` if running the query fails.
    pub fn find_with_limit(
        &self,
        database: &str,
        collection: &str,
        filter: &Bson,
        options: &Bson,
        projection: &Bson,
    ) -> Result<ResultSet, DbError> {
        log::info!("filter is {filter}");
        log::info!("opts {options}");
        log::info!("fields are {projection}");
        let opts = decode_options(options)?;
        let compiled = compile(filter_document(filter)?, &opts, projection_document(projection)?);
        let ns = Namespace::new(database, collection);
        Ok(query::execute(self.store.as_ref(), &ns, &compiled, self.deadline_instant())?)
    }

    /// [`Client::find_with_limit`] with JSON-encoded filter, options and projection.
    ///
    /// # Errors
    /// Returns an error if any JSON input is malformed, plus everything `find_with_limit` returns.
    pub fn find_with_limit_json(
        &self,
        database: &str,
        collection: &str,
        filter_json: &str,
        options_json: &str,
        projection_json: &str,
    ) -> Result<ResultSet, DbError> {
        let opts = decode_options_json(options_json)?;
        let filter = parse_json_document("filter", filter_json)?.unwrap_or_default();
        let projection = parse_json_document("projection", projection_json)?;
        let compiled = compile(filter, &opts, projection);
        let ns = Namespace::new(database, collection);
        Ok(query::execute(self.store.as_ref(), &ns, &compiled, self.deadline_instant())?)
    }

    /// First match in `_id` order, if any.
    ///
    /// # Errors
    /// Returns an error if the filter is rejected or the cursor fails.
    pub fn find_one(&self, database: &str, collection: &str, filter: &Bson) -> Result<Option<Document>, DbError> {
        let ns = Namespace::new(database, collection);
        log::info!("filter is {filter}");
        let compiled = query::CompiledQuery {
            filter: filter_document(filter)?,
            limit: Some(1),
            sort: vec![("_id".to_string(), query::SortDirection::Ascending)],
            projection: None,
        };
        let found = query::execute(self.store.as_ref(), &ns, &compiled, self.deadline_instant())?;
        log::debug!("found document {found:?}");
        Ok(found.into_iter().next())
    }

    /// Every document in the collection, in natural order.
    ///
    /// # Errors
    /// Returns an error if the cursor fails.
    pub fn find_all(&self, database: &str, collection: &str) -> Result<ResultSet, DbError> {
        log::info!("find all documents");
        let ns = Namespace::new(database, collection);
        Ok(query::execute_native(self.store.as_ref(), &ns, &NativeFind::all(), self.deadline_instant())?)
    }

    /// Deletes one match, with an `_id` index hint. Passing an `_id` filter is up to the caller.
    ///
    /// # Errors
    /// Returns an error if the filter is rejected.
    pub fn delete_one(&self, database: &str, collection: &str, filter: &Bson) -> Result<DeleteReport, DbError> {
        let ns = Namespace::new(database, collection);
        log::info!("filter is {filter}");
        let report = self.store.delete_one(&ns, &filter_document(filter)?, Some(&id_hint()))?;
        log::info!("deleted documents {}", report.deleted);
        Ok(report)
    }

    /// Deletes every match, with an `_id` index hint, and returns the count.
    ///
    /// # Errors
    /// Returns an error if the filter is rejected.
    pub fn delete_many(&self, database: &str, collection: &str, filter: &Bson) -> Result<u64, DbError> {
        let ns = Namespace::new(database, collection);
        log::info!("filter is {filter}");
        let report = self.store.delete_many(&ns, &filter_document(filter)?, Some(&id_hint()))?;
        log::info!("deleted documents {}", report.deleted);
        Ok(report.deleted)
    }

    /// # Errors
    /// Returns an error if the store is unavailable.
    pub fn drop_collection(&self, database: &str, collection: &str) -> Result<(), DbError> {
        log::info!("delete collection {database}.{collection} if present");
        self.store.drop_collection(&Namespace::new(database, collection))
    }

    /// # Errors
    /// Returns an error if the filter or update document is rejected.
    pub fn update_many(
        &self,
        database: &str,
        collection: &str,
        filter: &Bson,
        update: &Document,
    ) -> Result<UpdateReport, DbError> {
        let ns = Namespace::new(database, collection);
        log::info!("updating {ns}");
        self.store.update_many(&ns, &filter_document(filter)?, update)
    }

    /// Closes the shared connection. Every clone of this client is affected.
    ///
    /// # Errors
    /// Returns an error if the connection was already closed.
    pub fn disconnect(&self) -> Result<(), DbError> {
        log::info!("disconnecting from store");
        self.store.close()
    }

    fn deadline_instant(&self) -> Option<Instant> {
        self.deadline.map(|d| Instant::now() + d)
    }
}
