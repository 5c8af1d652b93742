//! Class-size shortcut: answers `count(*)` from class metadata instead of
//! scanning rows.

use std::sync::Arc;

use crate::error::ExecResult;
use crate::exec::context::CommandContext;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, VecStream};
use crate::row::Row;
use crate::value::Value;

/// Emits one row carrying the record count of a class under an alias.
pub struct CountFromClassStep {
    base: StepBase,
    class_name: String,
    alias: String,
}

impl CountFromClassStep {
    #[must_use]
    pub fn new(class_name: impl Into<String>, alias: impl Into<String>, profiling: bool) -> Self {
        Self {
            base: StepBase::new(profiling),
            class_name: class_name.into(),
            alias: alias.into(),
        }
    }
}

impl ExecutionStep for CountFromClassStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "CALCULATE CLASS SIZE"
    }

    fn target_detail(&self) -> Option<String> {
        Some(self.class_name.clone())
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        self.base.drain_previous(ctx)?;
        let count = ctx.session().record_count(&self.class_name)?;
        let row = Row::projection(vec![(self.alias.clone(), Value::Int(count as i64))]);
        Ok(Box::new(VecStream::single(row)))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        let step = Box::new(Self::new(
            self.class_name.clone(),
            self.alias.clone(),
            self.base.profiling(),
        ));
        Ok(with_previous(step, prev))
    }

    fn can_be_cached(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::stream::collect;
    use crate::memory::MemorySession;
    use crate::session::DatabaseSession;

    #[test]
    fn emits_one_row_with_the_aliased_count() {
        let session = Arc::new(MemorySession::new());
        session.create_class("Person", None).unwrap();
        for i in 0..3 {
            session
                .create_record("Person", vec![("n".to_string(), Value::Int(i))])
                .unwrap();
        }
        let ctx = CommandContext::new(session);

        let mut step = CountFromClassStep::new("Person", "count", false);
        let rows = collect(step.start(&ctx).unwrap(), &ctx).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("count"), Some(Value::Int(3)));
    }

    #[test]
    fn missing_class_is_an_error() {
        let ctx = CommandContext::new(Arc::new(MemorySession::new()));
        let mut step = CountFromClassStep::new("Nope", "count", false);
        assert!(step.start(&ctx).is_err());
    }
}
