//! Client-side query shaping for document stores.
//!
//! An untyped options bag (`{limit, sort: [{field, asc}]}`) is decoded strictly into
//! [`query::QueryOptions`], compiled together with a filter and projection into a
//! [`query::CompiledQuery`], executed through the [`store::DocumentStore`] seam, and the
//! cursor is materialized into a [`query::ResultSet`].

pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod import;
pub mod query;
pub mod store;
pub mod utils;

pub use client::Client;
pub use errors::{DbError, DecodeError, DecodeErrorKind, ExecutionError};
pub use query::{CompiledQuery, QueryOptions, ResultSet, SortDirection, SortKey};
pub use store::{DocumentStore, MemoryStore, Namespace, StoreCursor};
