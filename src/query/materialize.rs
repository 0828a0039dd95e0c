use bson::Document;
use std::time::Instant;

use super::types::{CompiledQuery, NativeFind, ResultSet};
use crate::errors::ExecutionError;
use crate::store::{DocumentStore, Namespace, StoreCursor};
use crate::utils::devlog::FindBench;

/// Closes the wrapped cursor when dropped, whichever way materialization exits.
struct CursorGuard {
    cursor: Box<dyn StoreCursor>,
    ns: String,
}

impl CursorGuard {
    fn advance(&mut self) -> Result<Option<Vec<u8>>, ExecutionError> {
        self.cursor.advance().map_err(|e| ExecutionError::Stream(e.to_string()))
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        if let Err(e) = self.cursor.close() {
            log::warn!("closing cursor on {} failed: {e}", self.ns);
        }
    }
}

/// Runs a compiled query and collects every record into a `ResultSet`.
///
/// Any failure (open, per-record decode, stream, deadline) discards what was collected so far.
/// The cursor is closed before this returns on every path.
///
/// # Errors
/// Returns an `ExecutionError` describing the first failure.
pub fn execute(
    store: &dyn DocumentStore,
    ns: &Namespace,
    compiled: &CompiledQuery,
    deadline: Option<Instant>,
) -> Result<ResultSet, ExecutionError> {
    let native = compiled.to_native().map_err(|e| ExecutionError::Open(e.to_string()))?;
    execute_native(store, ns, &native, deadline)
}

/// Same as [`execute`] for an already rendered `NativeFind`.
///
/// # Errors
/// Returns an `ExecutionError` describing the first failure.
pub fn execute_native(
    store: &dyn DocumentStore,
    ns: &Namespace,
    native: &NativeFind,
    deadline: Option<Instant>,
) -> Result<ResultSet, ExecutionError> {
    let start = Instant::now();
    let cursor = store.open_cursor(ns, native).map_err(|e| ExecutionError::Open(e.to_string()))?;
    let mut guard = CursorGuard { cursor, ns: ns.to_string() };
    let opened_ms = start.elapsed().as_millis();

    let mut list = ResultSet::new();
    loop {
        if let Some(dl) = deadline
            && Instant::now() > dl
        {
            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            log::warn!("find on {ns} hit its deadline after {} records", list.len());
            return Err(ExecutionError::Timeout { elapsed_ms });
        }
        let Some(raw) = guard.advance()? else {
            break;
        };
        let doc = Document::from_reader(raw.as_slice())
            .map_err(|e| ExecutionError::Decode { index: list.len(), reason: e.to_string() })?;
        list.push(doc);
    }
    drop(guard);

    let dur_ms = start.elapsed().as_millis();
    FindBench {
        ns,
        open_ms: opened_ms,
        duration_ms: dur_ms,
        result_count: list.len(),
        limit: native.limit.unwrap_or(0),
    }
    .emit();
    log::info!(target: "docbridge::metrics", "find on {ns} took {dur_ms} ms for {} records", list.len());
    Ok(list)
}
