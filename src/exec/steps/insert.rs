//! Record creation.

use std::sync::Arc;

use crate::ast::Expr;
use crate::error::ExecResult;
use crate::exec::context::CommandContext;
use crate::exec::eval::evaluate;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, VecStream};
use crate::row::{LiveRow, Row};

/// Creates one record from `SET` assignments and yields it as a live row.
pub struct InsertStep {
    base: StepBase,
    class_name: String,
    set_items: Vec<(String, Expr)>,
}

impl InsertStep {
    #[must_use]
    pub fn new(
        class_name: impl Into<String>,
        set_items: Vec<(String, Expr)>,
        profiling: bool,
    ) -> Self {
        Self {
            base: StepBase::new(profiling),
            class_name: class_name.into(),
            set_items,
        }
    }
}

impl ExecutionStep for InsertStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "INSERT INTO"
    }

    fn target_detail(&self) -> Option<String> {
        Some(self.class_name.clone())
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        self.base.drain_previous(ctx)?;
        let mut properties = Vec::with_capacity(self.set_items.len());
        for (name, expr) in &self.set_items {
            properties.push((name.clone(), evaluate(expr, ctx, None)?));
        }
        let entity = ctx.session().create_record(&self.class_name, properties)?;
        Ok(Box::new(VecStream::single(Row::Live(LiveRow::new(entity)))))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        let step = Box::new(Self::new(
            self.class_name.clone(),
            self.set_items.clone(),
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
    use crate::value::Value;

    #[test]
    fn creates_and_yields_the_record() {
        let session = Arc::new(MemorySession::new());
        session.create_class("Person", None).unwrap();
        let ctx = CommandContext::new(Arc::clone(&session) as Arc<dyn DatabaseSession>);

        let mut step = InsertStep::new(
            "Person",
            vec![("name".to_string(), Expr::literal("Alice"))],
            false,
        );
        let rows = collect(step.start(&ctx).unwrap(), &ctx).unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_live());
        assert_eq!(rows[0].get("name"), Some(Value::from("Alice")));
        assert_eq!(session.record_count("Person").unwrap(), 1);
    }

    #[test]
    fn set_expressions_read_context_variables() {
        let session = Arc::new(MemorySession::new());
        session.create_class("Person", None).unwrap();
        let ctx = CommandContext::new(session);
        ctx.set_variable("$n", Value::Int(7));

        let mut step = InsertStep::new(
            "Person",
            vec![("n".to_string(), Expr::variable("$n"))],
            false,
        );
        let rows = collect(step.start(&ctx).unwrap(), &ctx).unwrap();
        assert_eq!(rows[0].get("n"), Some(Value::Int(7)));
    }

    #[test]
    fn unknown_class_is_an_error() {
        let ctx = CommandContext::new(Arc::new(MemorySession::new()));
        let mut step = InsertStep::new("Nope", vec![], false);
        assert!(step.start(&ctx).is_err());
    }
}
