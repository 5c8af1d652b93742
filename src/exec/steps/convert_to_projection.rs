//! Detaches live rows at the top of a plan so results no longer observe
//! in-transaction mutation.

use std::sync::Arc;

use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, ExecutionStream};
use crate::row::Row;

/// Snapshots live rows into projection rows. Rows that are already
/// projections were not produced by the owning DML step and are dropped so
/// they cannot be emitted twice downstream.
pub struct ConvertToProjectionStep {
    base: StepBase,
}

impl ConvertToProjectionStep {
    #[must_use]
    pub fn new(profiling: bool) -> Self {
        Self { base: StepBase::new(profiling) }
    }
}

impl ExecutionStep for ConvertToProjectionStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "CONVERT TO PROJECTION RESULT"
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        let upstream = self
            .base
            .start_previous_or(ctx, "converting to projections requires a previous step")?;
        Ok(Box::new(ConvertStream { upstream, pending: None }))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        Ok(with_previous(Box::new(Self::new(self.base.profiling())), prev))
    }

    fn can_be_cached(&self) -> bool {
        true
    }
}

struct ConvertStream {
    upstream: BoxedStream,
    pending: Option<Row>,
}

impl ExecutionStream for ConvertStream {
    fn has_next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<bool> {
        while self.pending.is_none() {
            if !self.upstream.has_next(ctx)? {
                return Ok(false);
            }
            let row = self.upstream.next(ctx)?;
            if row.is_live() {
                self.pending = Some(Row::Projection(row.into_projection()));
            }
        }
        Ok(true)
    }

    fn next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<Row> {
        if !self.has_next(ctx)? {
            return Err(ExecutionError::IllegalState(
                "next() called on an exhausted stream".to_string(),
            ));
        }
        self.pending.take().ok_or_else(|| {
            ExecutionError::IllegalState("next() called on an exhausted stream".to_string())
        })
    }

    fn close(&mut self, ctx: &Arc<CommandContext>) {
        self.upstream.close(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::stream::collect;
    use crate::exec::steps::test_support::SourceStep;
    use crate::memory::MemorySession;
    use crate::session::DatabaseSession;
    use crate::row::LiveRow;
    use crate::value::Value;

    #[test]
    fn live_rows_become_detached_snapshots() {
        let session = Arc::new(MemorySession::new());
        session.create_class("Person", None).unwrap();
        let entity = session
            .create_record("Person", vec![("name".to_string(), Value::from("Alice"))])
            .unwrap();
        let ctx = CommandContext::new(session);

        let mut step = ConvertToProjectionStep::new(false);
        step.set_previous(Box::new(SourceStep::new(vec![Row::Live(LiveRow::new(
            Arc::clone(&entity),
        ))])));
        let rows = collect(step.start(&ctx).unwrap(), &ctx).unwrap();

        entity.write().unwrap().set("name", Value::from("Bob"));

        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_live());
        assert_eq!(rows[0].get("name"), Some(Value::from("Alice")));
        assert!(rows[0].rid().is_some());
    }

    #[test]
    fn rows_already_projected_are_dropped() {
        let session = Arc::new(MemorySession::new());
        session.create_class("Person", None).unwrap();
        let entity = session
            .create_record("Person", vec![("name".to_string(), Value::from("Alice"))])
            .unwrap();
        let ctx = CommandContext::new(session);

        let mut step = ConvertToProjectionStep::new(false);
        step.set_previous(Box::new(SourceStep::new(vec![
            Row::projection(vec![("name".to_string(), Value::from("ghost"))]),
            Row::Live(LiveRow::new(entity)),
        ])));
        let rows = collect(step.start(&ctx).unwrap(), &ctx).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(Value::from("Alice")));
    }

    #[test]
    fn missing_upstream_is_a_state_error() {
        let ctx = CommandContext::new(Arc::new(MemorySession::new()));
        let mut step = ConvertToProjectionStep::new(false);
        let err = step.start(&ctx).err().unwrap();
        assert!(matches!(err, ExecutionError::IllegalState(_)));
    }
}
