use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// One sort key. Position in `QueryOptions::sort` is its precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortKey {
    #[serde(alias = "Field")]
    pub field: String,
    #[serde(default, rename = "asc", alias = "Asc")]
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), ascending: true }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), ascending: false }
    }
}

/// Typed options for `find_with_limit`.
///
/// `limit == 0` means unbounded. `sort` is applied in the order given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryOptions {
    #[serde(default, alias = "Limit", deserialize_with = "super::options::deserialize_limit")]
    pub limit: u64,
    #[serde(default, alias = "Sort")]
    pub sort: Vec<SortKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Store-facing query derived from a filter, `QueryOptions` and a projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledQuery {
    pub filter: Document,
    /// `None` means no limit clause is sent at all.
    pub limit: Option<i64>,
    pub sort: Vec<(String, SortDirection)>,
    pub projection: Option<Document>,
}

impl CompiledQuery {
    /// Ordered sort clause as sent to the store, or `None` when no keys were given. Repeated
    /// fields are sent as given.
    #[must_use]
    pub fn sort_clause(&self) -> Option<Vec<(String, i32)>> {
        if self.sort.is_empty() {
            return None;
        }
        Some(self.sort.iter().map(|(field, dir)| (field.clone(), dir.as_i32())).collect())
    }

    /// Sort clause as a document, for stores that only take one.
    ///
    /// A document cannot repeat a key, so a repeated field keeps its first occurrence (position
    /// and direction); later occurrences could only break ties the first one already settled.
    #[must_use]
    pub fn sort_document(&self) -> Option<Document> {
        if self.sort.is_empty() {
            return None;
        }
        let mut out = Document::new();
        for (field, dir) in &self.sort {
            if !out.contains_key(field) {
                out.insert(field.clone(), Bson::Int32(dir.as_i32()));
            }
        }
        Some(out)
    }

    /// Renders the native find call: serialized filter plus limit, sort and projection.
    ///
    /// # Errors
    /// Returns an error if the filter cannot be serialized to BSON.
    pub fn to_native(&self) -> Result<NativeFind, bson::error::Error> {
        let mut filter = Vec::new();
        self.filter.to_writer(&mut filter)?;
        Ok(NativeFind {
            filter,
            limit: self.limit,
            sort: self.sort_clause(),
            projection: self.projection.clone(),
        })
    }
}

/// Native find request as handed to a `DocumentStore`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeFind {
    /// BSON-encoded filter document.
    pub filter: Vec<u8>,
    pub limit: Option<i64>,
    /// `(field, 1 | -1)` in precedence order; `None` sends no sort clause.
    pub sort: Option<Vec<(String, i32)>>,
    pub projection: Option<Document>,
}

impl NativeFind {
    /// Unfiltered, unlimited, unsorted find.
    #[must_use]
    pub fn all() -> Self {
        let mut filter = Vec::new();
        // An empty document always serializes.
        let _ = Document::new().to_writer(&mut filter);
        Self { filter, ..Self::default() }
    }
}

/// Materialized query output, in store delivery order.
pub type ResultSet = Vec<Document>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: u64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct InsertReport {
    pub inserted_ids: Vec<Bson>,
}
