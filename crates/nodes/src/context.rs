//! `ExecutionContext` — the mutable state carrier threaded through a single
//! run, plus its append-only event trace.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ContextError, ContractError};
use crate::outcome::ErrorSummary;

/// What kind of event was recorded in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    End,
    Error,
    Retry,
    CompensateStart,
    CompensateEnd,
    CompensateError,
}

/// Free-form payload carried by an [`Event`] — either a plain note or a
/// structured error summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Detail {
    Text(String),
    Error(ErrorSummary),
}

impl From<&str> for Detail {
    fn from(s: &str) -> Self {
        Detail::Text(s.to_string())
    }
}

impl From<String> for Detail {
    fn from(s: String) -> Self {
        Detail::Text(s)
    }
}

impl From<ErrorSummary> for Detail {
    fn from(e: ErrorSummary) -> Self {
        Detail::Error(e)
    }
}

/// A single entry in the execution trace.
///
/// `timestamp` is milliseconds elapsed since the owning [`ExecutionContext`]
/// was created, taken from a monotonic clock — never wall-clock — so the
/// "trace is strictly non-decreasing" invariant never depends on system
/// clock adjustments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    #[serde(rename = "node")]
    pub node_name: String,
    #[serde(rename = "ts")]
    pub timestamp: u64,
    pub attempt: u32,
    pub detail: Detail,
}

/// Ordered-array-with-type-tag encoding for `completed_steps`, per
/// SPEC_FULL.md §6: `{"__set__": ["a", "b"]}`. Equality between two contexts
/// compares set membership, not insertion order, so any enumeration order
/// round-trips correctly.
mod tagged_set {
    use std::collections::HashSet;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Tagged {
        #[serde(rename = "__set__")]
        items: Vec<String>,
    }

    pub fn serialize<S>(set: &HashSet<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut items: Vec<String> = set.iter().cloned().collect();
        items.sort();
        Tagged { items }.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<HashSet<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tagged = Tagged::deserialize(deserializer)?;
        Ok(tagged.items.into_iter().collect())
    }
}

/// Mutable, per-run state. Created once per run, owned exclusively by the
/// currently executing leaf (the runner guarantees at-most-one active leaf),
/// and handed back to the caller inside the terminal [`crate::outcome::Outcome`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext<T> {
    pub data: T,
    #[serde(default)]
    pub trace: Vec<Event>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(with = "tagged_set", default)]
    pub completed_steps: HashSet<String>,

    #[serde(skip, default = "Instant::now")]
    clock_start: Instant,
    #[serde(skip)]
    active: Arc<AtomicBool>,
    /// Set by `AsyncRunner::run` when the caller supplies one (SPEC_FULL.md
    /// §4.5/§5). `None` under the synchronous runner, which has no
    /// cancellation support at all.
    #[serde(skip)]
    cancellation: Option<CancellationToken>,
}

impl<T: PartialEq> PartialEq for ExecutionContext<T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
            && self.metadata == other.metadata
            && self.completed_steps == other.completed_steps
            && trace_eq(&self.trace, &other.trace)
    }
}

fn trace_eq(a: &[Event], b: &[Event]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| {
        x.kind == y.kind
            && x.node_name == y.node_name
            && x.attempt == y.attempt
            && serde_json::to_value(&x.detail).ok() == serde_json::to_value(&y.detail).ok()
    })
}

impl<T> ExecutionContext<T> {
    /// Create a fresh context wrapping the given payload.
    pub fn new(data: T) -> Self {
        Self {
            data,
            trace: Vec::new(),
            metadata: HashMap::new(),
            completed_steps: HashSet::new(),
            clock_start: Instant::now(),
            active: Arc::new(AtomicBool::new(false)),
            cancellation: None,
        }
    }

    /// Attach a cancellation token. Only `AsyncRunner` calls this; the
    /// synchronous runner never does, so `is_cancelled`/`cancelled` are
    /// always inert for a sync run.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Resolves when cancellation is requested. Never resolves if no token
    /// is attached, so selecting on it under the sync runner (which never
    /// calls this) would simply never fire — in practice only `Leaf::
    /// execute_async` awaits it.
    pub async fn cancelled(&self) {
        match &self.cancellation {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }

    /// Milliseconds elapsed since this context was created.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.clock_start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Append an event to the trace. The timestamp is stamped from the
    /// context's own monotonic clock, so callers never supply one directly.
    pub fn emit(&mut self, kind: EventKind, node_name: &str, attempt: u32, detail: impl Into<Detail>) {
        self.trace.push(Event {
            kind,
            node_name: node_name.to_string(),
            timestamp: self.elapsed_ms(),
            attempt,
            detail: detail.into(),
        });
    }

    /// Record that a leaf completed successfully.
    pub fn mark_completed(&mut self, name: impl Into<String>) {
        self.completed_steps.insert(name.into());
    }

    pub fn was_completed(&self, name: &str) -> bool {
        self.completed_steps.contains(name)
    }

    /// Guard against re-entrant `run()` calls (SPEC_FULL.md §4.4). Returns
    /// [`ContractError::Reentrant`] if the context is already active.
    pub fn begin_run(&self) -> Result<(), ContractError> {
        if self.active.swap(true, Ordering::SeqCst) {
            Err(ContractError::Reentrant)
        } else {
            Ok(())
        }
    }

    /// Clear the active flag set by [`Self::begin_run`].
    pub fn end_run(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl<T: Serialize> ExecutionContext<T> {
    /// Serialize the context to the JSON wire format described in
    /// SPEC_FULL.md §6.
    pub fn to_json(&self) -> Result<String, ContextError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<T: DeserializeOwned> ExecutionContext<T> {
    /// Reconstruct a context from JSON.
    ///
    /// Unknown top-level fields and missing optional fields are tolerated —
    /// a warning is logged via `tracing` rather than the call failing — but
    /// malformed JSON (including a `data` that doesn't match `T`) is a hard
    /// [`ContextError::Serialization`].
    pub fn from_json(payload: &str) -> Result<Self, ContextError> {
        let raw: serde_json::Value = serde_json::from_str(payload)?;
        if let Some(obj) = raw.as_object() {
            const KNOWN: &[&str] = &["data", "metadata", "trace", "completed_steps"];
            for key in obj.keys() {
                if !KNOWN.contains(&key.as_str()) {
                    tracing::warn!(field = %key, "ignoring unknown field while deserializing ExecutionContext");
                }
            }
            for key in KNOWN {
                if !obj.contains_key(*key) {
                    tracing::warn!(field = %key, "missing optional field while deserializing ExecutionContext, defaulting");
                }
            }
        }
        let ctx: ExecutionContext<T> = serde_json::from_value(raw)?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut ctx = ExecutionContext::new(42i32);
        ctx.emit(EventKind::Start, "a", 1, "starting");
        ctx.emit(EventKind::End, "a", 1, "succeeded");
        ctx.mark_completed("a");
        ctx.metadata.insert("request_id".to_string(), serde_json::json!("req-1"));

        let json = ctx.to_json().unwrap();
        let restored: ExecutionContext<i32> = ExecutionContext::from_json(&json).unwrap();

        assert_eq!(ctx, restored);
    }

    #[test]
    fn completed_steps_are_tagged_as_a_set_on_the_wire() {
        let mut ctx = ExecutionContext::new(());
        ctx.mark_completed("a");
        let json = ctx.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["completed_steps"]["__set__"], serde_json::json!(["a"]));
    }

    #[test]
    fn round_trip_is_insensitive_to_set_enumeration_order() {
        let mut ctx = ExecutionContext::new(());
        ctx.mark_completed("z");
        ctx.mark_completed("a");
        ctx.mark_completed("m");
        let restored: ExecutionContext<()> = ExecutionContext::from_json(&ctx.to_json().unwrap()).unwrap();
        assert_eq!(ctx, restored);
    }

    #[test]
    fn missing_optional_fields_default_instead_of_failing() {
        let payload = serde_json::json!({"data": 7}).to_string();
        let ctx: ExecutionContext<i32> = ExecutionContext::from_json(&payload).unwrap();
        assert_eq!(ctx.data, 7);
        assert!(ctx.trace.is_empty());
        assert!(ctx.metadata.is_empty());
        assert!(ctx.completed_steps.is_empty());
    }

    #[test]
    fn unknown_top_level_fields_are_tolerated() {
        let payload = serde_json::json!({"data": 1, "extra_field": "ignored"}).to_string();
        let ctx: ExecutionContext<i32> = ExecutionContext::from_json(&payload).unwrap();
        assert_eq!(ctx.data, 1);
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = ExecutionContext::<i32>::from_json("not json at all").unwrap_err();
        assert!(matches!(err, ContextError::Serialization(_)));
    }

    #[test]
    fn data_type_mismatch_is_a_serialization_error() {
        let payload = serde_json::json!({"data": "not an int"}).to_string();
        let err = ExecutionContext::<i32>::from_json(&payload).unwrap_err();
        assert!(matches!(err, ContextError::Serialization(_)));
    }

    #[test]
    fn reentrant_begin_run_is_rejected_until_end_run() {
        let ctx = ExecutionContext::new(());
        ctx.begin_run().unwrap();
        assert_eq!(ctx.begin_run().unwrap_err(), ContractError::Reentrant);
        ctx.end_run();
        ctx.begin_run().unwrap();
    }

    #[test]
    fn trace_timestamps_are_non_decreasing() {
        let mut ctx = ExecutionContext::new(());
        ctx.emit(EventKind::Start, "a", 1, "starting");
        std::thread::sleep(std::time::Duration::from_millis(5));
        ctx.emit(EventKind::End, "a", 1, "succeeded");
        assert!(ctx.trace[1].timestamp >= ctx.trace[0].timestamp);
    }
}
