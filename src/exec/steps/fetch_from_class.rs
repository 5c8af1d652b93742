//! Full-class scan source.

use std::sync::Arc;

use crate::error::ExecResult;
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, VecStream};
use crate::row::{LiveRow, Row};

/// Emits every record of a class (including subclasses) as a live row.
pub struct FetchFromClassStep {
    base: StepBase,
    class_name: String,
}

impl FetchFromClassStep {
    #[must_use]
    pub fn new(class_name: impl Into<String>, profiling: bool) -> Self {
        Self { base: StepBase::new(profiling), class_name: class_name.into() }
    }
}

impl ExecutionStep for FetchFromClassStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "FETCH FROM CLASS"
    }

    fn target_detail(&self) -> Option<String> {
        Some(self.class_name.clone())
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        self.base.drain_previous(ctx)?;
        let entities = ctx.session().scan_class(&self.class_name)?;
        let rows = entities
            .into_iter()
            .map(|entity| Row::Live(LiveRow::new(entity)))
            .collect();
        Ok(Box::new(VecStream::new(rows)))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        let step = Box::new(Self::new(self.class_name.clone(), self.base.profiling()));
        Ok(with_previous(step, prev))
    }

    fn can_be_cached(&self) -> bool {
        // The scan happens at start, not at plan build, so cached copies
        // always see current data.
        true
    }
}
