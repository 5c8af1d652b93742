//! Keyed index-size shortcut: answers `count(*) WHERE prop = <key>` by
//! counting index entries under the key.

use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::Expr;
use crate::error::ExecResult;
use crate::exec::context::CommandContext;
use crate::exec::eval::evaluate;
use crate::exec::step::{copy_previous, with_previous, BoxedStep, ExecutionStep, StepBase};
use crate::exec::stream::{BoxedStream, VecStream};
use crate::row::Row;
use crate::value::Value;

/// Emits one row carrying the number of distinct records indexed under a
/// key. The key expression is evaluated once, at start.
pub struct CountFromIndexWithKeyStep {
    base: StepBase,
    index_name: String,
    key: Expr,
    alias: String,
}

impl CountFromIndexWithKeyStep {
    #[must_use]
    pub fn new(
        index_name: impl Into<String>,
        key: Expr,
        alias: impl Into<String>,
        profiling: bool,
    ) -> Self {
        Self {
            base: StepBase::new(profiling),
            index_name: index_name.into(),
            key,
            alias: alias.into(),
        }
    }
}

impl ExecutionStep for CountFromIndexWithKeyStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "CALCULATE INDEX SIZE BY KEY"
    }

    fn target_detail(&self) -> Option<String> {
        Some(self.index_name.clone())
    }

    fn internal_start(&mut self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStream> {
        self.base.drain_previous(ctx)?;
        let key = evaluate(&self.key, ctx, None)?;
        let entries = ctx.session().index_lookup(&self.index_name, &key)?;
        // Duplicate entries for the same record count once.
        let distinct: HashSet<_> = entries.iter().map(|e| e.rid).collect();
        let row = Row::projection(vec![(
            self.alias.clone(),
            Value::Int(distinct.len() as i64),
        )]);
        Ok(Box::new(VecStream::single(row)))
    }

    fn copy(&self, ctx: &Arc<CommandContext>) -> ExecResult<BoxedStep> {
        let prev = copy_previous(&self.base, ctx)?;
        let step = Box::new(Self::new(
            self.index_name.clone(),
            self.key.clone(),
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
    use crate::value::RecordId;

    fn seeded() -> Arc<MemorySession> {
        let session = Arc::new(MemorySession::new());
        session.create_class("Person", None).unwrap();
        session.create_index("Person.name", "Person", "name");
        for name in ["a", "a", "b"] {
            session
                .create_record("Person", vec![("name".to_string(), Value::from(name))])
                .unwrap();
        }
        session
    }

    fn run(session: Arc<MemorySession>, key: &str) -> i64 {
        let ctx = CommandContext::new(session);
        let mut step = CountFromIndexWithKeyStep::new(
            "Person.name",
            Expr::literal(key),
            "count",
            false,
        );
        let rows = collect(step.start(&ctx).unwrap(), &ctx).unwrap();
        assert_eq!(rows.len(), 1);
        rows[0].get("count").and_then(|v| v.as_int()).unwrap()
    }

    #[test]
    fn counts_records_under_the_key() {
        assert_eq!(run(seeded(), "a"), 2);
    }

    #[test]
    fn absent_key_counts_zero() {
        assert_eq!(run(seeded(), "zzz"), 0);
    }

    #[test]
    fn duplicate_entries_for_one_record_count_once() {
        let session = seeded();
        let rid = {
            let hits = session.index_lookup("Person.name", &Value::from("b")).unwrap();
            hits[0].rid
        };
        session.index_put("Person.name", Value::from("b"), rid);
        assert_eq!(run(session, "b"), 1);
        assert_ne!(rid, RecordId::new(0, 0));
    }
}
