//! Source step that pulls its rows from a nested plan.
//!
//! The nested plan runs in its own context; each row it emits is also
//! bound as `$current` in that context so correlated expressions inside
//! the nested plan's consumers resolve. An attached upstream is drained
//! for its side effects before the nested plan starts.

use std::sync::Arc;

use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, ExecutionStream};
use crate::plan::ExecutionPlan;
use crate::row::Row;

/// Runs a nested plan as the row source.
pub struct SubQueryStep {
    base: StepBase,
    sub_plan: Box<dyn ExecutionPlan>,
    sub_ctx: Arc<CommandContext>,
    owner_ctx: Arc<CommandContext>,
}

impl SubQueryStep {
    #[must_use]
    pub fn new(
        sub_plan: Box<dyn ExecutionPlan>,
        sub_ctx: Arc<CommandContext>,
        owner_ctx: Arc<CommandContext>,
        profiling: bool,
    ) -> Self {
        Self { base: StepBase::new(profiling), sub_plan, sub_ctx, owner_ctx }
    }
}

impl ExecutionStep for SubQueryStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "FETCH FROM SUBQUERY"
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        self.base.drain_previous(ctx)?;
        let inner = self.sub_plan.start(&self.sub_ctx)?;
        Ok(Box::new(SubQueryStream {
            inner,
            sub_ctx: Arc::clone(&self.sub_ctx),
        }))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        // A copied step runs entirely in the new context; the nested plan
        // no longer gets a context of its own.
        let step = Box::new(Self::new(
            self.sub_plan.copy_plan(ctx)?,
            Arc::clone(ctx),
            Arc::clone(ctx),
            self.base.profiling(),
        ));
        Ok(with_previous(step, prev))
    }

    fn can_be_cached(&self) -> bool {
        self.sub_ctx.id() == self.owner_ctx.id() && self.sub_plan.can_be_cached()
    }

    fn close(&mut self, ctx: &Arc<CommandContext>) {
        self.sub_plan.close(&self.sub_ctx);
        if let Some(prev) = self.base_mut().prev_mut() {
            prev.close(ctx);
        }
    }
}

struct SubQueryStream {
    inner: BoxedStream,
    sub_ctx: Arc<CommandContext>,
}

impl ExecutionStream for SubQueryStream {
    fn has_next(&mut self, _ctx: &Arc<CommandContext>) -> ExecResult<bool> {
        self.inner.has_next(&self.sub_ctx)
    }

    fn next(&mut self, _ctx: &Arc<CommandContext>) -> ExecResult<Row> {
        if !self.inner.has_next(&self.sub_ctx)? {
            return Err(ExecutionError::IllegalState(
                "next() called on an exhausted stream".to_string(),
            ));
        }
        let row = self.inner.next(&self.sub_ctx)?;
        self.sub_ctx.set_current(&row);
        Ok(row)
    }

    fn close(&mut self, _ctx: &Arc<CommandContext>) {
        self.inner.close(&self.sub_ctx);
    }
}
