//! Index-size shortcut: answers `count(*)` over an index target from index
//! metadata.

use std::sync::Arc;

use crate::ast::IndexLookupKind;
use crate::error::ExecResult;
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, VecStream};
use crate::row::Row;
use crate::value::Value;

/// Emits one row carrying the entry count of an index under an alias.
pub struct CountFromIndexStep {
    base: StepBase,
    index_name: String,
    kind: IndexLookupKind,
    alias: String,
}

impl CountFromIndexStep {
    #[must_use]
    pub fn new(
        index_name: impl Into<String>,
        kind: IndexLookupKind,
        alias: impl Into<String>,
        profiling: bool,
    ) -> Self {
        Self {
            base: StepBase::new(profiling),
            index_name: index_name.into(),
            kind,
            alias: alias.into(),
        }
    }
}

impl ExecutionStep for CountFromIndexStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "CALCULATE INDEX SIZE"
    }

    fn target_detail(&self) -> Option<String> {
        Some(self.index_name.clone())
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        self.base.drain_previous(ctx)?;
        let count = ctx.session().index_entry_count(&self.index_name, self.kind)?;
        let row = Row::projection(vec![(self.alias.clone(), Value::Int(count as i64))]);
        Ok(Box::new(VecStream::single(row)))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        let step = Box::new(Self::new(
            self.index_name.clone(),
            self.kind,
            self.alias.clone(),
            self.base.profiling(),
        ));
        Ok(with_previous(step, prev))
    }

    fn can_be_cached(&self) -> bool {
        false
    }
}
