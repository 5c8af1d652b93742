//! Zero-count guarantee: a `count(*)` query always yields exactly one row,
//! even when the aggregation upstream produced nothing.

use std::sync::Arc;

use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, ExecutionStream};
use crate::row::Row;
use crate::value::Value;

/// Ensures exactly one row flows out: the upstream's first row, or a
/// synthetic `{alias: 0}` row when the upstream is empty. The upstream is
/// not pulled until the first downstream pull.
pub struct GuaranteeEmptyCountStep {
    base: StepBase,
    alias: String,
}

impl GuaranteeEmptyCountStep {
    #[must_use]
    pub fn new(alias: impl Into<String>, profiling: bool) -> Self {
        Self { base: StepBase::new(profiling), alias: alias.into() }
    }
}

impl ExecutionStep for GuaranteeEmptyCountStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "GUARANTEE FOR ZERO COUNT"
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        let upstream = self
            .base
            .start_previous_or(ctx, "guaranteeing a zero count requires a previous step")?;
        Ok(Box::new(GuaranteeStream {
            upstream,
            alias: self.alias.clone(),
            emitted: false,
        }))
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

struct GuaranteeStream {
    upstream: BoxedStream,
    alias: String,
    emitted: bool,
}

impl ExecutionStream for GuaranteeStream {
    fn has_next(&mut self, _ctx: &Arc<CommandContext>) -> ExecResult<bool> {
        Ok(!self.emitted)
    }

    fn next(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<Row> {
        if self.emitted {
            return Err(ExecutionError::IllegalState(
                "next() called on an exhausted stream".to_string(),
            ));
        }
        self.emitted = true;
        if self.upstream.has_next(ctx)? {
            self.upstream.next(ctx)
        } else {
            Ok(Row::projection(vec![(self.alias.clone(), Value::Int(0))]))
        }
    }

    fn close(&mut self, ctx: &Arc<CommandContext>) {
        self.upstream.close(ctx);
    }
}
