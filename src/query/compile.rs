use bson::Document;

use super::types::{CompiledQuery, QueryOptions, SortDirection};

/// Compiles a filter, decoded options and a projection into a `CompiledQuery`.
///
/// Filter and projection pass through uninterpreted; malformed shapes surface from the store at
/// execution time. A limit of zero compiles to no limit clause at all.
#[must_use]
pub fn compile(
    filter: Document,
    options: &QueryOptions,
    projection: Option<Document>,
) -> CompiledQuery {
    let limit = match options.limit {
        0 => None,
        n => Some(i64::try_from(n).unwrap_or(i64::MAX)),
    };
    let sort = options
        .sort
        .iter()
        .map(|k| {
            let dir = if k.ascending { SortDirection::Ascending } else { SortDirection::Descending };
            (k.field.clone(), dir)
        })
        .collect();
    CompiledQuery { filter, limit, sort, projection }
}
