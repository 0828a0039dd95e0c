//! Developer bench lines ("dev6") for query timing.
//!
//! Every line goes to the `docbridge::dev6` log target at trace level. A thread can also open a
//! [`Capture`] to collect its own lines, which keeps test assertions independent of whatever global
//! logger is (or is not) installed.

use std::cell::RefCell;

use crate::store::Namespace;

thread_local! {
    static CAPTURED: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Collects dev6 lines emitted on the current thread until dropped.
pub struct Capture {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl Capture {
    /// Starts capturing on this thread, discarding anything a previous capture left behind.
    #[must_use]
    pub fn start() -> Self {
        CAPTURED.with(|c| *c.borrow_mut() = Some(Vec::new()));
        Self { _not_send: std::marker::PhantomData }
    }

    /// Takes the lines captured so far.
    pub fn take(&self) -> Vec<String> {
        CAPTURED.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
    }

    /// Lines captured so far, left in place.
    #[must_use]
    pub fn peek(&self) -> Vec<String> {
        CAPTURED.with(|c| c.borrow().clone().unwrap_or_default())
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        CAPTURED.with(|c| *c.borrow_mut() = None);
    }
}

#[doc(hidden)]
pub fn record(line: String) {
    CAPTURED.with(|c| {
        if let Some(buf) = c.borrow_mut().as_mut() {
            buf.push(line.clone());
        }
    });
    log::trace!(target: "docbridge::dev6", "{line}");
}

/// Emits one formatted dev6 line.
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {
        $crate::utils::devlog::record(format!($($arg)*))
    };
}

/// Timing of one materialized find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindBench<'a> {
    pub ns: &'a Namespace,
    pub open_ms: u128,
    pub duration_ms: u128,
    pub result_count: usize,
    /// 0 when no limit clause was sent.
    pub limit: i64,
}

impl FindBench<'_> {
    /// Emits the bench line as a single JSON object.
    pub fn emit(&self) {
        let line = serde_json::json!({
            "bench": "query",
            "op": "find",
            "ns": self.ns.to_string(),
            "open_ms": u64::try_from(self.open_ms).unwrap_or(u64::MAX),
            "duration_ms": u64::try_from(self.duration_ms).unwrap_or(u64::MAX),
            "result_count": self.result_count,
            "limit": self.limit,
        });
        crate::dev6!("{line}");
    }
}
