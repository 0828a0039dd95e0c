//! The seam between the query pipeline and a document store.

mod eval;
pub mod memory;

use bson::{Bson, Document};
use std::fmt;

use crate::errors::DbError;
use crate::query::{DeleteReport, InsertReport, NativeFind, UpdateReport};

pub use memory::MemoryStore;

/// A `database.collection` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { database: database.into(), collection: collection.into() }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// A server-side result stream. Records are handed out BSON-encoded; decoding is the caller's job.
pub trait StoreCursor: Send {
    /// Next record, `Ok(None)` at end of stream.
    ///
    /// # Errors
    /// Returns an error if the stream broke (network, server-side failure).
    fn advance(&mut self) -> Result<Option<Vec<u8>>, DbError>;

    /// Releases server-side resources. Must be safe to call more than once.
    ///
    /// # Errors
    /// Returns an error if the store could not release the cursor.
    fn close(&mut self) -> Result<(), DbError>;
}

/// Primitive operations of a document store. Implementations own their concurrency control.
pub trait DocumentStore: Send + Sync {
    /// Opens a cursor for a native find.
    ///
    /// # Errors
    /// Returns an error if the filter, sort or projection is rejected or the store is unavailable.
    fn open_cursor(&self, ns: &Namespace, find: &NativeFind) -> Result<Box<dyn StoreCursor>, DbError>;

    /// Inserts one document and returns its `_id`.
    ///
    /// # Errors
    /// Returns an error on any store-level failure (e.g. duplicate `_id`).
    fn insert_one(&self, ns: &Namespace, doc: Document) -> Result<Bson, DbError>;

    /// Inserts documents in order, stopping at the first failure.
    ///
    /// # Errors
    /// Returns an error on the first document the store rejects.
    fn insert_many(&self, ns: &Namespace, docs: Vec<Document>) -> Result<InsertReport, DbError>;

    /// Deletes the first matching document in `hint` index order.
    ///
    /// # Errors
    /// Returns an error if the filter or hint is rejected.
    fn delete_one(&self, ns: &Namespace, filter: &Document, hint: Option<&Document>) -> Result<DeleteReport, DbError>;

    /// Deletes every matching document.
    ///
    /// # Errors
    /// Returns an error if the filter or hint is rejected.
    fn delete_many(&self, ns: &Namespace, filter: &Document, hint: Option<&Document>) -> Result<DeleteReport, DbError>;

    /// Drops a collection. Dropping a missing collection succeeds.
    ///
    /// # Errors
    /// Returns an error if the store is unavailable.
    fn drop_collection(&self, ns: &Namespace) -> Result<(), DbError>;

    /// Applies an operator update to every matching document.
    ///
    /// # Errors
    /// Returns an error if the filter or update document is rejected.
    fn update_many(&self, ns: &Namespace, filter: &Document, update: &Document) -> Result<UpdateReport, DbError>;

    /// Releases the connection. Subsequent calls fail.
    ///
    /// # Errors
    /// Returns an error if the store was already closed.
    fn close(&self) -> Result<(), DbError>;
}
