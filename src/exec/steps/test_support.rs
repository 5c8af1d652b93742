//! A canned source step for exercising downstream steps in isolation.

use std::sync::Arc;

use crate::error::ExecResult;
use crate::exec::context::CommandContext;
use crate::exec::step::{BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, VecStream};
use crate::row::Row;

/// Emits a fixed batch of rows.
pub struct SourceStep {
    base: StepBase,
    rows: Vec<Row>,
}

impl SourceStep {
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self { base: StepBase::new(false), rows }
    }
}

impl ExecutionStep for SourceStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "SOURCE"
    }

    fn internal_start(&mut self, _ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        Ok(Box::new(VecStream::new(self.rows.clone())))
    }

    fn copy(&self, _ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        Ok(Box::new(Self::new(self.rows.clone())))
    }

    fn can_be_cached(&self) -> bool {
        true
    }
}
