//! Row streams produced by execution steps.
//!
//! A stream is pulled with `has_next`/`next` until exhausted, then closed.
//! Steps return lazily-evaluating streams where the semantics require it
//! (e.g. the zero-count guarantee), and eager [`VecStream`]s where the
//! whole result is computed at start.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::row::Row;

/// A pull-based stream of rows.
pub trait ExecutionStream {
    /// True when another row is available. Idempotent between pulls.
    fn has_next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<bool>;

    /// Produces the next row. Calling past the end is a state error.
    fn next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<Row>;

    /// Releases resources. Idempotent.
    fn close(&mut self, ctx: &Arc<CommandContext>);
}

/// A boxed stream, the shape steps hand back from `start`.
pub type BoxedStream = Box<dyn ExecutionStream>;

/// An eager stream over a pre-computed batch of rows.
pub struct VecStream {
    rows: std::vec::IntoIter<Row>,
    peeked: Option<Row>,
    closed: bool,
}

impl VecStream {
    /// Wraps a batch of rows.
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into_iter(), peeked: None, closed: false }
    }

    /// A stream yielding exactly one row.
    #[must_use]
    pub fn single(row: Row) -> Self {
        Self::new(vec![row])
    }

    /// A stream yielding no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl ExecutionStream for VecStream {
    fn has_next(&mut self, _ctx: &Arc<CommandContext>) -> ExecResult<bool> {
        if self.closed {
            return Ok(false);
        }
        if self.peeked.is_none() {
            self.peeked = self.rows.next();
        }
        Ok(self.peeked.is_some())
    }

    fn next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<Row> {
        self.has_next(ctx)?;
        self.peeked.take().ok_or_else(|| {
            ExecutionError::IllegalState("next() called on an exhausted stream".to_string())
        })
    }

    fn close(&mut self, _ctx: &Arc<CommandContext>) {
        self.closed = true;
        self.peeked = None;
    }
}

/// Wraps a stream and charges time spent in `has_next`/`next` to a shared
/// cost counter, in microseconds.
pub struct ProfiledStream {
    inner: BoxedStream,
    cost_micros: Arc<AtomicU64>,
}

impl ProfiledStream {
    /// Wraps `inner`, accumulating into `cost_micros`.
    #[must_use]
    pub fn new(inner: BoxedStream, cost_micros: Arc<AtomicU64>) -> Self {
        Self { inner, cost_micros }
    }

    fn charge(&self, started: Instant) {
        let micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.cost_micros.fetch_add(micros, Ordering::Relaxed);
    }
}

impl ExecutionStream for ProfiledStream {
    fn has_next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<bool> {
        let started = Instant::now();
        let result = self.inner.has_next(ctx);
        self.charge(started);
        result
    }

    fn next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<Row> {
        let started = Instant::now();
        let result = self.inner.next(ctx);
        self.charge(started);
        result
    }

    fn close(&mut self, ctx: &Arc<CommandContext>) {
        self.inner.close(ctx);
    }
}

/// Drains a stream into a vector and closes it.
pub fn collect(mut stream: BoxedStream, ctx: &Arc<CommandContext>) -> ExecResult<Vec<Row>> {
    let mut rows = Vec::new();
    while stream.has_next(ctx)? {
        rows.push(stream.next(ctx)?);
    }
    stream.close(ctx);
    Ok(rows)
}
