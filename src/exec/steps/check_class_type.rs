//! Class-hierarchy precondition for commands that require their target to
//! sit under a given base class.

use std::sync::Arc;

use crate::error::{ExecResult, ExecutionError};
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, VecStream};

/// Verifies at start that `class_name` is `base` or a subclass of it, then
/// passes the upstream through untouched (or yields nothing as a source).
pub struct CheckClassTypeStep {
    base_step: StepBase,
    class_name: String,
    base_class: String,
}

impl CheckClassTypeStep {
    #[must_use]
    pub fn new(
        class_name: impl Into<String>,
        base_class: impl Into<String>,
        profiling: bool,
    ) -> Self {
        Self {
            base_step: StepBase::new(profiling),
            class_name: class_name.into(),
            base_class: base_class.into(),
        }
    }
}

impl ExecutionStep for CheckClassTypeStep {
    fn base(&self) -> &StepBase {
        &self.base_step
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base_step
    }

    fn name(&self) -> &'static str {
        "CHECK CLASS HIERARCHY"
    }

    fn target_detail(&self) -> Option<String> {
        Some(format!("{} IS A {}", self.class_name, self.base_class))
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        if !ctx.session().is_subclass_of(&self.class_name, &self.base_class)? {
            return Err(ExecutionError::Command(format!(
                "class {} is not a subclass of {}",
                self.class_name, self.base_class
            )));
        }
        match self.base_step.prev_mut() {
            Some(prev) => prev.start(ctx),
            None => Ok(Box::new(VecStream::empty())),
        }
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base_step, ctx)?;
        let step = Box::new(Self::new(
            self.class_name.clone(),
            self.base_class.clone(),
            self.base_step.profiling(),
        ));
        Ok(with_previous(step, prev))
    }

    fn can_be_cached(&self) -> bool {
        true
    }
}
