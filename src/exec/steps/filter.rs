//! Row filtering by a boolean expression.

use std::sync::Arc;

use crate::ast::Expr;
use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::eval::evaluate;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, ExecutionStream};
use crate::row::Row;

/// Passes through the rows for which the condition is truthy.
pub struct FilterStep {
    base: StepBase,
    condition: Expr,
}

impl FilterStep {
    #[must_use]
    pub fn new(condition: Expr, profiling: bool) -> Self {
        Self { base: StepBase::new(profiling), condition }
    }
}

impl ExecutionStep for FilterStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "FILTER"
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        let upstream = self
            .base
            .start_previous_or(ctx, "filtering requires a previous step")?;
        Ok(Box::new(FilterStream {
            upstream,
            condition: self.condition.clone(),
            pending: None,
        }))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        let step = Box::new(Self::new(self.condition.clone(), self.base.profiling()));
        Ok(with_previous(step, prev))
    }

    fn can_be_cached(&self) -> bool {
        true
    }
}

struct FilterStream {
    upstream: BoxedStream,
    condition: Expr,
    pending: Option<Row>,
}

impl FilterStream {
    fn advance(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<()> {
        while self.pending.is_none() && self.upstream.has_next(ctx)? {
            let row = self.upstream.next(ctx)?;
            if evaluate(&self.condition, ctx, Some(&row))?.is_truthy() {
                self.pending = Some(row);
            }
        }
        Ok(())
    }
}

impl ExecutionStream for FilterStream {
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
        self.upstream.close(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use crate::exec::stream::collect;
    use crate::exec::steps::test_support::SourceStep;
    use crate::memory::MemorySession;
    use crate::value::Value;

    #[test]
    fn keeps_only_matching_rows() {
        let ctx = CommandContext::new(Arc::new(MemorySession::new()));
        let rows: Vec<Row> = (1..=4)
            .map(|n| Row::projection(vec![("n".to_string(), Value::Int(n))]))
            .collect();

        let condition =
            Expr::binary(BinaryOp::Gt, Expr::property("n"), Expr::literal(2i64));
        let mut step = FilterStep::new(condition, false);
        step.set_previous(Box::new(SourceStep::new(rows)));

        let rows = collect(step.start(&ctx).unwrap(), &ctx).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("n"), Some(Value::Int(3)));
    }

    #[test]
    fn missing_property_filters_the_row_out() {
        let ctx = CommandContext::new(Arc::new(MemorySession::new()));
        let rows = vec![Row::projection(vec![])];

        let condition =
            Expr::binary(BinaryOp::Eq, Expr::property("n"), Expr::literal(1i64));
        let mut step = FilterStep::new(condition, false);
        step.set_previous(Box::new(SourceStep::new(rows)));

        let rows = collect(step.start(&ctx).unwrap(), &ctx).unwrap();
        assert!(rows.is_empty());
    }
}
