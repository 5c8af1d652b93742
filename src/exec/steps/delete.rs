//! Record deletion.

use std::sync::Arc;

use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, ExecutionStream, VecStream};
use crate::row::Row;
use crate::value::Value;

/// Deletes every record flowing from upstream and emits one `{count: n}`
/// row with the number deleted.
pub struct DeleteStep {
    base: StepBase,
}

impl DeleteStep {
    #[must_use]
    pub fn new(profiling: bool) -> Self {
        Self { base: StepBase::new(profiling) }
    }
}

impl ExecutionStep for DeleteStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        let mut upstream = self
            .base
            .start_previous_or(ctx, "deleting requires a previous step")?;
        let mut count = 0i64;
        while upstream.has_next(ctx)? {
            let row = upstream.next(ctx)?;
            let rid = row.rid().ok_or_else(|| {
                ExecutionError::IllegalState("cannot delete a row with no record".to_string())
            })?;
            ctx.session().delete_record(rid)?;
            count += 1;
        }
        upstream.close(ctx);
        Ok(Box::new(VecStream::single(Row::projection(vec![(
            "count".to_string(),
            Value::Int(count),
        )]))))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        Ok(with_previous(Box::new(Self::new(self.base.profiling())), prev))
    }

    fn can_be_cached(&self) -> bool {
        false
    }
}
