//! Row-counting aggregation.

use std::sync::Arc;

use crate::error::ExecResult;
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, ExecutionStream, VecStream};
use crate::row::Row;
use crate::value::Value;

/// Counts upstream rows into a single `{alias: n}` row. An empty upstream
/// produces no output at all; the zero-count guarantee downstream turns
/// that into a zero row.
pub struct AggregateCountStep {
    base: StepBase,
    alias: String,
}

impl AggregateCountStep {
    #[must_use]
    pub fn new(alias: impl Into<String>, profiling: bool) -> Self {
        Self { base: StepBase::new(profiling), alias: alias.into() }
    }
}

impl ExecutionStep for AggregateCountStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "COUNT ROWS"
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        let mut upstream = self
            .base
            .start_previous_or(ctx, "counting rows requires a previous step")?;
        let mut count = 0i64;
        while upstream.has_next(ctx)? {
            upstream.next(ctx)?;
            count += 1;
        }
        upstream.close(ctx);

        if count == 0 {
            return Ok(Box::new(VecStream::empty()));
        }
        Ok(Box::new(VecStream::single(Row::projection(vec![(
            self.alias.clone(),
            Value::Int(count),
        )]))))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        let step = Box::new(Self::new(self.alias.clone(), self.base.profiling()));
        Ok(with_previous(step, prev))
    }

    fn can_be_cached(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::stream::collect;
    use crate::exec::steps::test_support::SourceStep;
    use crate::memory::MemorySession;

    fn run(input: Vec<Row>) -> Vec<Row> {
        let ctx = CommandContext::new(Arc::new(MemorySession::new()));
        let mut step = AggregateCountStep::new("count", false);
        step.set_previous(Box::new(SourceStep::new(input)));
        collect(step.start(&ctx).unwrap(), &ctx).unwrap()
    }

    #[test]
    fn counts_rows() {
        let rows = run(vec![
            Row::projection(vec![("a".to_string(), Value::Int(1))]),
            Row::projection(vec![("a".to_string(), Value::Int(2))]),
        ]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("count"), Some(Value::Int(2)));
    }

    #[test]
    fn empty_upstream_produces_no_rows() {
        assert!(run(vec![]).is_empty());
    }
}
