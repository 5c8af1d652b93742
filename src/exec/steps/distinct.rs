//! Row deduplication over the full value tuple.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, ExecutionStream};
use crate::row::Row;
use crate::value::Value;

/// Drops rows whose value tuple has already been seen. The seen-set lives
/// in the stream, so a cached copy of the step starts clean.
pub struct DistinctStep {
    base: StepBase,
}

impl DistinctStep {
    #[must_use]
    pub fn new(profiling: bool) -> Self {
        Self { base: StepBase::new(profiling) }
    }
}

impl ExecutionStep for DistinctStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "DISTINCT"
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        let upstream = self
            .base
            .start_previous_or(ctx, "distinct requires a previous step")?;
        Ok(Box::new(DistinctStream { upstream, seen: HashSet::new(), pending: None }))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        Ok(with_previous(Box::new(Self::new(self.base.profiling())), prev))
    }

    fn can_be_cached(&self) -> bool {
        true
    }
}

struct DistinctStream {
    upstream: BoxedStream,
    seen: HashSet<String>,
    pending: Option<Row>,
}

impl DistinctStream {
    fn tuple_key(row: &Row) -> String {
        let mut key = String::new();
        for name in row.property_names() {
            let value = row.get(&name).unwrap_or(Value::Null);
            key.push_str(&name);
            key.push('=');
            key.push_str(&value.dedup_key());
            key.push(';');
        }
        key
    }

    fn advance(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<()> {
        while self.pending.is_none() && self.upstream.has_next(ctx)? {
            let row = self.upstream.next(ctx)?;
            if self.seen.insert(Self::tuple_key(&row)) {
                self.pending = Some(row);
            }
        }
        Ok(())
    }
}

impl ExecutionStream for DistinctStream {
    fn has_next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<bool> {
        self.advance(ctx)?;
        Ok(self.pending.is_some())
    }

    fn next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<Row> {
        self.advance(ctx)?;
        self.pending.take().ok_or_else(|| {
            ExecutionError::IllegalState("next() called on an exhausted stream".to_string())
        })
    }

    fn close(&mut self, ctx: &Arc<CommandContext>) {
        self.pending = None;
        self.seen.clear();
        self.upstream.close(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::stream::collect;
    use crate::exec::steps::test_support::SourceStep;
    use crate::memory::MemorySession;

    fn ctx() -> Arc<CommandContext> {
        CommandContext::new(Arc::new(MemorySession::new()))
    }

    fn row(n: i64) -> Row {
        Row::projection(vec![("n".to_string(), Value::Int(n))])
    }

    #[test]
    fn duplicates_are_dropped_keeping_first() {
        let ctx = ctx();
        let mut step = DistinctStep::new(false);
        step.set_previous(Box::new(SourceStep::new(vec![row(1), row(2), row(1)])));

        let rows = collect(step.start(&ctx).unwrap(), &ctx).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("n"), Some(Value::Int(1)));
        assert_eq!(rows[1].get("n"), Some(Value::Int(2)));
    }

    #[test]
    fn variant_types_never_collide() {
        let ctx = ctx();
        let rows = vec![
            Row::projection(vec![("n".to_string(), Value::Int(1))]),
            Row::projection(vec![("n".to_string(), Value::from("1"))]),
        ];
        let mut step = DistinctStep::new(false);
        step.set_previous(Box::new(SourceStep::new(rows)));

        let rows = collect(step.start(&ctx).unwrap(), &ctx).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn copies_start_with_a_fresh_seen_set() {
        let ctx = ctx();
        let mut step = DistinctStep::new(false);
        step.set_previous(Box::new(SourceStep::new(vec![row(1)])));
        let rows = collect(step.start(&ctx).unwrap(), &ctx).unwrap();
        assert_eq!(rows.len(), 1);

        let mut copy = step.copy(&ctx).unwrap();
        let rows = collect(copy.start(&ctx).unwrap(), &ctx).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
